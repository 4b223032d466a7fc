//! Event envelope carried in every WebSocket text frame:
//! `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

pub fn encode(event: &str, data: &Value) -> Result<String, serde_json::Error> {
    serde_json::to_string(&serde_json::json!({ "event": event, "data": data }))
}

pub fn decode(text: &str) -> Result<Envelope, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shape() {
        let text = encode("viewer_heartbeat", &serde_json::json!({"viewer_id": "v1"}))
            .expect("encode");
        let raw: Value = serde_json::from_str(&text).expect("json");
        assert_eq!(raw["event"], "viewer_heartbeat");
        assert_eq!(raw["data"]["viewer_id"], "v1");
    }

    #[test]
    fn missing_data_defaults_to_null() {
        let env = decode(r#"{"event":"restart_script"}"#).expect("decode");
        assert_eq!(env, Envelope::new("restart_script", Value::Null));
    }

    #[test]
    fn non_envelope_is_error() {
        assert!(decode(r#"{"data": 1}"#).is_err());
        assert!(decode("not json").is_err());
    }
}
