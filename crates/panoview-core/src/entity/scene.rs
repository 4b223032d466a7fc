//! Scene entities: meshes, animated meshes, point clouds and arrows.
//!
//! Each kind carries an explicit table of settable fields. Remote updates go
//! through [`SceneEntity::set_field`]; keys outside the table are rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::field::{FieldResult, parse, unknown};
use super::material::MaterialValue;
use crate::types::{ColorSpec, Rgb, Vec3};

const ORIGIN: Vec3 = [0.0, 0.0, 0.0];
const UNIT_SCALE: Vec3 = [1.0, 1.0, 1.0];

fn set_material(slot: &mut Option<MaterialValue>, value: Value) -> FieldResult {
    if value.is_null() {
        *slot = None;
        return Ok(None);
    }
    let decoded = MaterialValue::decode(value);
    *slot = Some(decoded.value);
    Ok(decoded.warning)
}

// ─── Mesh ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub name: String,
    pub vertices: Vec<Vec3>,
    pub faces: Vec<[u32; 3]>,
    pub visible: bool,
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
    pub vertex_colors: Option<Vec<Rgb>>,
    pub face_colors: Option<Vec<Rgb>>,
    pub material: Option<MaterialValue>,
}

impl Mesh {
    pub const FIELDS: &'static [&'static str] = &[
        "vertices",
        "faces",
        "visible",
        "position",
        "rotation",
        "scale",
        "vertex_colors",
        "face_colors",
        "material",
    ];

    pub fn new(vertices: Vec<Vec3>, faces: Vec<[u32; 3]>) -> Self {
        Self {
            name: String::new(),
            vertices,
            faces,
            visible: true,
            position: ORIGIN,
            rotation: ORIGIN,
            scale: UNIT_SCALE,
            vertex_colors: None,
            face_colors: None,
            material: None,
        }
    }

    #[must_use]
    pub fn with_material(mut self, material: impl Into<MaterialValue>) -> Self {
        self.material = Some(material.into());
        self
    }

    #[must_use]
    pub fn with_vertex_colors(mut self, colors: Vec<Rgb>) -> Self {
        self.vertex_colors = Some(colors);
        self
    }

    #[must_use]
    pub fn with_transform(mut self, position: Vec3, rotation: Vec3, scale: Vec3) -> Self {
        self.position = position;
        self.rotation = rotation;
        self.scale = scale;
        self
    }

    fn set_field(&mut self, field: &str, value: Value) -> FieldResult {
        match field {
            "vertices" => self.vertices = parse(field, value)?,
            "faces" => self.faces = parse(field, value)?,
            "visible" => self.visible = parse(field, value)?,
            "position" => self.position = parse(field, value)?,
            "rotation" => self.rotation = parse(field, value)?,
            "scale" => self.scale = parse(field, value)?,
            "vertex_colors" => self.vertex_colors = parse(field, value)?,
            "face_colors" => self.face_colors = parse(field, value)?,
            "material" => return set_material(&mut self.material, value),
            _ => return Err(unknown("mesh", field)),
        }
        Ok(None)
    }
}

// ─── AnimatedMesh ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimatedMesh {
    pub name: String,
    /// One vertex array per frame.
    pub vertices: Vec<Vec<Vec3>>,
    pub faces: Vec<[u32; 3]>,
    pub framerate: f32,
    pub visible: bool,
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
    pub color: Rgb,
    pub vertex_colors: Option<Vec<Rgb>>,
    pub face_colors: Option<Vec<Rgb>>,
    pub material: Option<MaterialValue>,
}

impl AnimatedMesh {
    pub const FIELDS: &'static [&'static str] = &[
        "vertices",
        "faces",
        "framerate",
        "visible",
        "position",
        "rotation",
        "scale",
        "color",
        "vertex_colors",
        "face_colors",
        "material",
    ];

    pub fn new(frames: Vec<Vec<Vec3>>, faces: Vec<[u32; 3]>) -> Self {
        Self {
            name: String::new(),
            vertices: frames,
            faces,
            framerate: 24.0,
            visible: true,
            position: ORIGIN,
            rotation: ORIGIN,
            scale: UNIT_SCALE,
            color: [1.0, 1.0, 1.0],
            vertex_colors: None,
            face_colors: None,
            material: None,
        }
    }

    #[must_use]
    pub fn with_framerate(mut self, framerate: f32) -> Self {
        self.framerate = framerate;
        self
    }

    pub fn frame_count(&self) -> usize {
        self.vertices.len()
    }

    fn set_field(&mut self, field: &str, value: Value) -> FieldResult {
        match field {
            "vertices" => self.vertices = parse(field, value)?,
            "faces" => self.faces = parse(field, value)?,
            "framerate" => self.framerate = parse(field, value)?,
            "visible" => self.visible = parse(field, value)?,
            "position" => self.position = parse(field, value)?,
            "rotation" => self.rotation = parse(field, value)?,
            "scale" => self.scale = parse(field, value)?,
            "color" => self.color = parse(field, value)?,
            "vertex_colors" => self.vertex_colors = parse(field, value)?,
            "face_colors" => self.face_colors = parse(field, value)?,
            "material" => return set_material(&mut self.material, value),
            _ => return Err(unknown("animated_mesh", field)),
        }
        Ok(None)
    }
}

// ─── Points ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Points {
    pub name: String,
    pub points: Vec<Vec3>,
    pub colors: ColorSpec,
    pub size: f32,
    pub visible: bool,
    pub opacity: f32,
}

impl Points {
    pub const FIELDS: &'static [&'static str] = &["points", "colors", "size", "visible", "opacity"];

    pub fn new(points: Vec<Vec3>) -> Self {
        Self {
            name: String::new(),
            points,
            colors: ColorSpec::Uniform([0.5, 0.5, 0.5]),
            size: 0.01,
            visible: true,
            opacity: 1.0,
        }
    }

    #[must_use]
    pub fn with_colors(mut self, colors: ColorSpec) -> Self {
        self.colors = colors;
        self
    }

    #[must_use]
    pub fn with_size(mut self, size: f32) -> Self {
        self.size = size;
        self
    }

    fn set_field(&mut self, field: &str, value: Value) -> FieldResult {
        match field {
            "points" => self.points = parse(field, value)?,
            "colors" => self.colors = parse(field, value)?,
            "size" => self.size = parse(field, value)?,
            "visible" => self.visible = parse(field, value)?,
            "opacity" => self.opacity = parse(field, value)?,
            _ => return Err(unknown("points", field)),
        }
        Ok(None)
    }
}

// ─── Arrows ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arrows {
    pub name: String,
    pub starts: Vec<Vec3>,
    pub ends: Vec<Vec3>,
    pub color: ColorSpec,
    pub width: f32,
    pub visible: bool,
    pub opacity: f32,
}

impl Arrows {
    pub const FIELDS: &'static [&'static str] =
        &["starts", "ends", "color", "width", "visible", "opacity"];

    pub fn new(starts: Vec<Vec3>, ends: Vec<Vec3>) -> Self {
        Self {
            name: String::new(),
            starts,
            ends,
            color: ColorSpec::default(),
            width: 0.01,
            visible: true,
            opacity: 1.0,
        }
    }

    #[must_use]
    pub fn with_color(mut self, color: ColorSpec) -> Self {
        self.color = color;
        self
    }

    fn set_field(&mut self, field: &str, value: Value) -> FieldResult {
        match field {
            "starts" => self.starts = parse(field, value)?,
            "ends" => self.ends = parse(field, value)?,
            "color" => self.color = parse(field, value)?,
            "width" => self.width = parse(field, value)?,
            "visible" => self.visible = parse(field, value)?,
            "opacity" => self.opacity = parse(field, value)?,
            _ => return Err(unknown("arrows", field)),
        }
        Ok(None)
    }
}

// ─── SceneEntity ─────────────────────────────────────────────────────

/// Any geometry object the registry can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SceneEntity {
    Mesh(Mesh),
    AnimatedMesh(AnimatedMesh),
    Points(Points),
    Arrows(Arrows),
}

impl SceneEntity {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Mesh(_) => "mesh",
            Self::AnimatedMesh(_) => "animated_mesh",
            Self::Points(_) => "points",
            Self::Arrows(_) => "arrows",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Mesh(m) => &m.name,
            Self::AnimatedMesh(m) => &m.name,
            Self::Points(p) => &p.name,
            Self::Arrows(a) => &a.name,
        }
    }

    pub(crate) fn set_name(&mut self, name: String) {
        match self {
            Self::Mesh(m) => m.name = name,
            Self::AnimatedMesh(m) => m.name = name,
            Self::Points(p) => p.name = name,
            Self::Arrows(a) => a.name = name,
        }
    }

    /// Names of the fields an update may set on this kind.
    pub fn settable_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Mesh(_) => Mesh::FIELDS,
            Self::AnimatedMesh(_) => AnimatedMesh::FIELDS,
            Self::Points(_) => Points::FIELDS,
            Self::Arrows(_) => Arrows::FIELDS,
        }
    }

    /// Set one field from a wire value. Returns a warning for non-fatal
    /// decode fallbacks (material).
    pub fn set_field(&mut self, field: &str, value: Value) -> FieldResult {
        match self {
            Self::Mesh(m) => m.set_field(field, value),
            Self::AnimatedMesh(m) => m.set_field(field, value),
            Self::Points(p) => p.set_field(field, value),
            Self::Arrows(a) => a.set_field(field, value),
        }
    }

    /// Wire form: the tagged field map.
    pub fn to_wire(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl From<Mesh> for SceneEntity {
    fn from(m: Mesh) -> Self {
        Self::Mesh(m)
    }
}

impl From<AnimatedMesh> for SceneEntity {
    fn from(m: AnimatedMesh) -> Self {
        Self::AnimatedMesh(m)
    }
}

impl From<Points> for SceneEntity {
    fn from(p: Points) -> Self {
        Self::Points(p)
    }
}

impl From<Arrows> for SceneEntity {
    fn from(a: Arrows) -> Self {
        Self::Arrows(a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldError;

    fn triangle() -> Mesh {
        Mesh::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            vec![[0, 1, 2]],
        )
    }

    #[test]
    fn wire_form_is_tagged() {
        let mut entity = SceneEntity::from(triangle());
        entity.set_name("tri".into());
        let wire = entity.to_wire();
        assert_eq!(wire["type"], "mesh");
        assert_eq!(wire["name"], "tri");
        assert_eq!(wire["faces"], serde_json::json!([[0, 1, 2]]));
        assert_eq!(wire["visible"], true);
    }

    #[test]
    fn set_known_field() {
        let mut entity = SceneEntity::from(triangle());
        let warning = entity
            .set_field("visible", serde_json::json!(false))
            .expect("visible is settable");
        assert!(warning.is_none());
        let SceneEntity::Mesh(mesh) = &entity else {
            panic!("still a mesh");
        };
        assert!(!mesh.visible);
    }

    #[test]
    fn unknown_field_rejected() {
        let mut entity = SceneEntity::from(Points::new(vec![[0.0; 3]]));
        let err = entity
            .set_field("faces", serde_json::json!([]))
            .expect_err("points have no faces");
        assert!(matches!(err, FieldError::UnknownField { kind: "points", .. }));
    }

    #[test]
    fn invalid_value_leaves_field_untouched() {
        let mut entity = SceneEntity::from(triangle());
        let err = entity
            .set_field("position", serde_json::json!([1.0, 2.0]))
            .expect_err("position needs three components");
        assert!(matches!(err, FieldError::InvalidValue { .. }));
        let SceneEntity::Mesh(mesh) = &entity else {
            panic!("still a mesh");
        };
        assert_eq!(mesh.position, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn material_fallback_warns_but_sets() {
        let mut entity = SceneEntity::from(triangle());
        let raw = serde_json::json!({"type": "Unknown", "x": 1});
        let warning = entity
            .set_field("material", raw.clone())
            .expect("material never fails");
        assert!(warning.is_some());
        let SceneEntity::Mesh(mesh) = &entity else {
            panic!("still a mesh");
        };
        assert_eq!(mesh.material, Some(MaterialValue::Raw(raw)));
    }

    #[test]
    fn animated_mesh_defaults() {
        let anim = AnimatedMesh::new(vec![vec![[0.0; 3]]; 4], vec![]);
        assert_eq!(anim.frame_count(), 4);
        assert_eq!(anim.framerate, 24.0);
        assert_eq!(anim.color, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn settable_fields_cover_setters() {
        let mut entity = SceneEntity::from(Arrows::new(vec![], vec![]));
        for field in entity.settable_fields() {
            let err = entity.set_field(field, serde_json::json!({"bogus": true}));
            assert!(
                !matches!(err, Err(FieldError::UnknownField { .. })),
                "{field} listed but not settable"
            );
        }
    }
}
