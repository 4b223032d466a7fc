//! Mesh materials: a tagged union on `type`, with a raw fallback for
//! payloads that do not decode.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Rgb;

fn default_color() -> Rgb {
    [1.0, 1.0, 1.0]
}

fn default_opacity() -> f32 {
    1.0
}

fn default_roughness() -> f32 {
    0.5
}

fn default_shininess() -> f32 {
    30.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    Front,
    Back,
    Double,
}

/// Typed materials understood by the frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Material {
    MeshStandardMaterial {
        #[serde(default = "default_color")]
        color: Rgb,
        #[serde(default = "default_roughness")]
        roughness: f32,
        #[serde(default)]
        metalness: f32,
        #[serde(default = "default_opacity")]
        opacity: f32,
        #[serde(default)]
        transparent: bool,
        #[serde(default)]
        flat_shading: bool,
        #[serde(default)]
        wireframe: bool,
        #[serde(default)]
        side: Side,
    },
    MeshBasicMaterial {
        #[serde(default = "default_color")]
        color: Rgb,
        #[serde(default = "default_opacity")]
        opacity: f32,
        #[serde(default)]
        transparent: bool,
        #[serde(default)]
        wireframe: bool,
        #[serde(default)]
        side: Side,
    },
    MeshPhongMaterial {
        #[serde(default = "default_color")]
        color: Rgb,
        #[serde(default = "default_shininess")]
        shininess: f32,
        #[serde(default = "default_opacity")]
        opacity: f32,
        #[serde(default)]
        transparent: bool,
        #[serde(default)]
        flat_shading: bool,
        #[serde(default)]
        side: Side,
    },
    MeshNormalMaterial {
        #[serde(default)]
        flat_shading: bool,
        #[serde(default)]
        wireframe: bool,
        #[serde(default)]
        side: Side,
    },
}

impl Default for Material {
    fn default() -> Self {
        Self::MeshStandardMaterial {
            color: default_color(),
            roughness: default_roughness(),
            metalness: 0.0,
            opacity: 1.0,
            transparent: false,
            flat_shading: false,
            wireframe: false,
            side: Side::Front,
        }
    }
}

/// A material slot value: decoded, or the raw payload when decoding failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaterialValue {
    Typed(Material),
    Raw(Value),
}

/// Result of reconstructing a material from an update payload.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialDecode {
    pub value: MaterialValue,
    pub warning: Option<String>,
}

impl MaterialValue {
    /// Reconstruct a material from `raw`.
    ///
    /// Objects carrying a `type` tag are decoded into [`Material`]; on failure
    /// the raw object is kept and a warning is returned. Anything else is
    /// stored raw without a warning.
    pub fn decode(raw: Value) -> MaterialDecode {
        let tagged = raw.as_object().is_some_and(|m| m.contains_key("type"));
        if !tagged {
            return MaterialDecode {
                value: Self::Raw(raw),
                warning: None,
            };
        }
        match serde_json::from_value::<Material>(raw.clone()) {
            Ok(material) => MaterialDecode {
                value: Self::Typed(material),
                warning: None,
            },
            Err(e) => MaterialDecode {
                value: Self::Raw(raw),
                warning: Some(format!("Could not recreate material from dict: {e}")),
            },
        }
    }
}

impl From<Material> for MaterialValue {
    fn from(m: Material) -> Self {
        Self::Typed(m)
    }
}
