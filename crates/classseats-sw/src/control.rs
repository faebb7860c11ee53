//! Control messages posted by the page.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message from the page, decoded by its `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Activate the waiting version now instead of after old pages close.
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,

    /// Anything else; ignored.
    #[serde(other)]
    Unknown,
}

impl ControlMessage {
    /// Decode any JSON payload; shapes that don't decode become `Unknown`.
    pub fn from_value(value: &Value) -> Self {
        Self::deserialize(value).unwrap_or(Self::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_skip_waiting() {
        assert_eq!(
            ControlMessage::from_value(&json!({ "type": "SKIP_WAITING" })),
            ControlMessage::SkipWaiting
        );
    }

    #[test]
    fn test_skip_waiting_with_extra_fields() {
        assert_eq!(
            ControlMessage::from_value(&json!({ "type": "SKIP_WAITING", "from": "banner" })),
            ControlMessage::SkipWaiting
        );
    }

    #[test]
    fn test_unknown_shapes() {
        for value in [
            json!({ "type": "CLAIM" }),
            json!({ "type": "skip_waiting" }),
            json!({ "kind": "SKIP_WAITING" }),
            json!("SKIP_WAITING"),
            json!(null),
            json!([1, 2]),
        ] {
            assert_eq!(ControlMessage::from_value(&value), ControlMessage::Unknown, "{value}");
        }
    }

    #[test]
    fn test_serializes_wire_shape() {
        let wire = serde_json::to_value(ControlMessage::SkipWaiting).unwrap();
        assert_eq!(wire, json!({ "type": "SKIP_WAITING" }));
    }
}
