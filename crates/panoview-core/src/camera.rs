use serde::{Deserialize, Serialize};

use crate::types::Vec3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionMode {
    #[default]
    Perspective,
    Orthographic,
}

/// Camera state reported by the frontend.
///
/// | key             | meaning                              |
/// |-----------------|--------------------------------------|
/// | position        | camera world coords                  |
/// | rotation        | XYZ euler rotation                   |
/// | quaternion      | rotation as quaternion               |
/// | up              | up-vector                            |
/// | target          | point the camera is looking at       |
/// | fov             | vertical field of view (degrees)     |
/// | near / far      | clip plane distances                 |
/// | aspect          | viewport aspect ratio (w / h)        |
/// | projection_mode | perspective or orthographic          |
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraInfo {
    pub position: Option<Vec3>,
    pub rotation: Option<Vec3>,
    pub quaternion: Option<[f32; 4]>,
    pub up: Option<Vec3>,
    pub target: Option<Vec3>,
    pub fov: Option<f32>,
    pub near: Option<f32>,
    pub far: Option<f32>,
    pub aspect: Option<f32>,
    pub projection_mode: Option<ProjectionMode>,
}

/// Partial camera update; unset fields are left alone by the frontend.
pub type CameraUpdate = CameraInfo;

impl CameraInfo {
    /// Camera every fresh frontend is reset to on resync.
    pub fn reset_default() -> Self {
        Self {
            projection_mode: Some(ProjectionMode::Perspective),
            fov: Some(50.0),
            near: Some(0.1),
            far: Some(1000.0),
            ..Self::default()
        }
    }

    pub fn look_at(position: Vec3, target: Vec3) -> Self {
        Self {
            position: Some(position),
            target: Some(target),
            ..Self::default()
        }
    }

    /// Wire form with unset fields dropped.
    pub fn to_wire(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let serde_json::Value::Object(map) = &mut value {
            map.retain(|_, v| !v.is_null());
        }
        value
    }
}
