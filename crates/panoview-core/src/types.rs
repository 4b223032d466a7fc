use std::fmt;

use serde::{Deserialize, Serialize};

/// Length of the random hex suffix used for synthesized names and ids.
const SUFFIX_LEN: usize = 8;

/// Return `"{prefix}_"` followed by eight random hex characters.
pub fn synthesize_name(prefix: &str) -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &hex[..SUFFIX_LEN])
}

// ─── Viewer identity ─────────────────────────────────────────────────

/// Opaque identity of one viewer session on a shared transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewerId(String);

impl ViewerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh `viewer_xxxxxxxx` identity.
    pub fn generate() -> Self {
        Self(synthesize_name("viewer"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when `payload["viewer_id"]` names this viewer.
    pub fn matches(&self, payload: &serde_json::Value) -> bool {
        payload.get("viewer_id").and_then(|v| v.as_str()) == Some(self.0.as_str())
    }
}

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ViewerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ─── Geometry primitives ─────────────────────────────────────────────

pub type Vec3 = [f32; 3];
pub type Rgb = [f32; 3];
pub type Rgba = [f32; 4];

/// A color that is either uniform across all items or given per item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorSpec {
    Uniform(Rgb),
    PerItem(Vec<Rgb>),
}

impl Default for ColorSpec {
    fn default() -> Self {
        Self::Uniform([0.0, 0.0, 0.0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_names_have_hex_suffix() {
        let name = synthesize_name("mesh");
        let suffix = name.strip_prefix("mesh_").expect("prefix kept");
        assert_eq!(suffix.len(), 8);
        assert!(suffix.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn synthesized_names_differ() {
        assert_ne!(synthesize_name("points"), synthesize_name("points"));
    }

    #[test]
    fn viewer_id_matches_payload() {
        let id = ViewerId::new("viewer_a");
        assert!(id.matches(&serde_json::json!({"viewer_id": "viewer_a"})));
        assert!(!id.matches(&serde_json::json!({"viewer_id": "viewer_b"})));
        assert!(!id.matches(&serde_json::json!({})));
        assert!(!id.matches(&serde_json::json!("viewer_a")));
    }

    #[test]
    fn color_spec_untagged_roundtrip() {
        let uniform: ColorSpec = serde_json::from_value(serde_json::json!([1.0, 0.5, 0.0]))
            .expect("uniform parses");
        assert_eq!(uniform, ColorSpec::Uniform([1.0, 0.5, 0.0]));
        let per: ColorSpec =
            serde_json::from_value(serde_json::json!([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]))
                .expect("per-item parses");
        assert!(matches!(per, ColorSpec::PerItem(ref v) if v.len() == 2));
    }
}
