//! JSON message envelope: control vs. application classification.
//!
//! A control message is a JSON object carrying `"control": true` plus a
//! `type` discriminant and a `details` payload. Anything without the control
//! marker is an application message: an arbitrary JSON value that may carry a
//! `room` routing field naming the target room. The routing field is attached
//! by the sending peer and stripped before the payload reaches any handler.
//!
//! # Invariants
//!
//! - Classification is total: every syntactically valid JSON value decodes to
//!   exactly one [`Message`] variant. Only non-JSON input or a control
//!   envelope with an unknown `type` is rejected as malformed.
//! - Application payloads never retain the routing field after decoding.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ProtocolError, Result};

/// Wire field marking a JSON object as a control message.
const CONTROL_MARKER: &str = "control";

/// Wire field carrying the target room name on application messages.
const ROUTING_FIELD: &str = "room";

/// Resolved room identity, as reported in `roomJoined` replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    /// Server-generated room id, immutable for the room's lifetime.
    pub id: u64,
    /// Collision-free resolved room name.
    pub name: String,
}

/// Control message payloads, discriminated by the wire `type` field.
///
/// `JoinRoom`/`LeaveRoom` flow client-to-server; the remaining variants are
/// server replies. Control operations are the only ones with a client
/// awaiting a structured acknowledgement, so only they produce `Error`
/// replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum Control {
    /// Client requests membership in the named room.
    #[serde(rename = "joinRoom")]
    JoinRoom {
        /// Resolved room name to join.
        name: String,
    },

    /// Client leaves the named room.
    #[serde(rename = "leaveRoom")]
    LeaveRoom {
        /// Resolved room name to leave.
        name: String,
    },

    /// Server acknowledges a join with the resolved room identity.
    #[serde(rename = "roomJoined")]
    RoomJoined {
        /// The room the sender now belongs to.
        room: RoomInfo,
    },

    /// Server acknowledges a leave with the post-removal member count.
    #[serde(rename = "roomLeft")]
    RoomLeft {
        /// Resolved name of the room that was left.
        name: String,
        /// Member count after the sender's removal.
        clients: usize,
    },

    /// Server-reported protocol failure.
    #[serde(rename = "Error")]
    Error {
        /// Human-readable failure description.
        error: String,
    },
}

/// A classified wire message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Protocol-level instruction or structured reply.
    Control(Control),

    /// Arbitrary user payload, optionally addressed to a room.
    Application {
        /// Target room name carried by the routing field, if present.
        room: Option<String>,
        /// The user payload with routing metadata already stripped.
        payload: Value,
    },
}

impl Message {
    /// Decode a raw wire string into a classified message.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] if the input is not valid JSON,
    /// or if it claims to be a control message but does not match any known
    /// control shape.
    pub fn decode(raw: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        match value {
            Value::Object(mut map)
                if map.get(CONTROL_MARKER).and_then(Value::as_bool) == Some(true) =>
            {
                map.remove(CONTROL_MARKER);
                let control = serde_json::from_value(Value::Object(map))
                    .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
                Ok(Self::Control(control))
            },
            Value::Object(mut map) => {
                // Only a string-valued routing field is routing metadata; any
                // other shape stays in the payload untouched.
                let room = match map.remove(ROUTING_FIELD) {
                    Some(Value::String(name)) => Some(name),
                    Some(other) => {
                        map.insert(ROUTING_FIELD.to_string(), other);
                        None
                    },
                    None => None,
                };
                Ok(Self::Application { room, payload: Value::Object(map) })
            },
            other => Ok(Self::Application { room: None, payload: other }),
        }
    }

    /// Encode a message into its wire string.
    ///
    /// Application payloads that are not JSON objects cannot carry the
    /// routing field and are transmitted unrouted.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] if serialization fails.
    pub fn encode(&self) -> Result<String> {
        let value = match self {
            Self::Control(control) => {
                let serialized = serde_json::to_value(control)
                    .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
                match serialized {
                    Value::Object(mut map) => {
                        map.insert(CONTROL_MARKER.to_string(), Value::Bool(true));
                        Value::Object(map)
                    },
                    other => other,
                }
            },
            Self::Application { room: Some(name), payload: Value::Object(map) } => {
                let mut map = map.clone();
                map.insert(ROUTING_FIELD.to_string(), Value::String(name.clone()));
                Value::Object(map)
            },
            Self::Application { payload, .. } => payload.clone(),
        };

        serde_json::to_string(&value).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decode_join_room_control() {
        let raw = r#"{"control":true,"type":"joinRoom","details":{"name":"lobby"}}"#;
        let message = Message::decode(raw).unwrap();

        assert_eq!(message, Message::Control(Control::JoinRoom { name: "lobby".to_string() }));
    }

    #[test]
    fn decode_leave_room_control() {
        let raw = r#"{"control":true,"type":"leaveRoom","details":{"name":"lobby"}}"#;
        let message = Message::decode(raw).unwrap();

        assert_eq!(message, Message::Control(Control::LeaveRoom { name: "lobby".to_string() }));
    }

    #[test]
    fn decode_application_strips_routing_field() {
        let raw = r#"{"text":"hi","room":"lobby"}"#;
        let message = Message::decode(raw).unwrap();

        match message {
            Message::Application { room, payload } => {
                assert_eq!(room.as_deref(), Some("lobby"));
                assert_eq!(payload, json!({"text": "hi"}));
            },
            Message::Control(_) => panic!("expected application message"),
        }
    }

    #[test]
    fn decode_application_without_routing_field() {
        let message = Message::decode(r#"{"text":"hi"}"#).unwrap();

        match message {
            Message::Application { room, payload } => {
                assert_eq!(room, None);
                assert_eq!(payload, json!({"text": "hi"}));
            },
            Message::Control(_) => panic!("expected application message"),
        }
    }

    #[test]
    fn decode_non_string_routing_field_stays_in_payload() {
        let message = Message::decode(r#"{"room":42,"text":"hi"}"#).unwrap();

        match message {
            Message::Application { room, payload } => {
                assert_eq!(room, None);
                assert_eq!(payload, json!({"room": 42, "text": "hi"}));
            },
            Message::Control(_) => panic!("expected application message"),
        }
    }

    #[test]
    fn decode_non_object_payload_is_unrouted_application() {
        let message = Message::decode("[1,2,3]").unwrap();

        assert_eq!(message, Message::Application { room: None, payload: json!([1, 2, 3]) });
    }

    #[test]
    fn decode_false_control_marker_is_application() {
        let message = Message::decode(r#"{"control":false,"text":"hi"}"#).unwrap();

        match message {
            Message::Application { room, payload } => {
                assert_eq!(room, None);
                assert_eq!(payload, json!({"control": false, "text": "hi"}));
            },
            Message::Control(_) => panic!("expected application message"),
        }
    }

    #[test]
    fn decode_unknown_control_type_is_malformed() {
        let raw = r#"{"control":true,"type":"shutdown","details":{}}"#;
        let err = Message::decode(raw).unwrap_err();

        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn decode_invalid_json_is_malformed() {
        let err = Message::decode("{not json").unwrap_err();

        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn encode_control_reply_shapes() {
        let joined = Message::Control(Control::RoomJoined {
            room: RoomInfo { id: 7, name: "lobby".to_string() },
        });
        let encoded: Value = serde_json::from_str(&joined.encode().unwrap()).unwrap();
        assert_eq!(
            encoded,
            json!({"control": true, "type": "roomJoined", "details": {"room": {"id": 7, "name": "lobby"}}})
        );

        let left =
            Message::Control(Control::RoomLeft { name: "lobby".to_string(), clients: 2 });
        let encoded: Value = serde_json::from_str(&left.encode().unwrap()).unwrap();
        assert_eq!(
            encoded,
            json!({"control": true, "type": "roomLeft", "details": {"name": "lobby", "clients": 2}})
        );

        let error =
            Message::Control(Control::Error { error: "No rooms available".to_string() });
        let encoded: Value = serde_json::from_str(&error.encode().unwrap()).unwrap();
        assert_eq!(
            encoded,
            json!({"control": true, "type": "Error", "details": {"error": "No rooms available"}})
        );
    }

    #[test]
    fn encode_application_attaches_routing_field() {
        let message = Message::Application {
            room: Some("lobby".to_string()),
            payload: json!({"text": "hi"}),
        };
        let encoded: Value = serde_json::from_str(&message.encode().unwrap()).unwrap();

        assert_eq!(encoded, json!({"text": "hi", "room": "lobby"}));
    }

    #[test]
    fn encode_non_object_payload_drops_routing_field() {
        let message =
            Message::Application { room: Some("lobby".to_string()), payload: json!("hi") };
        let encoded: Value = serde_json::from_str(&message.encode().unwrap()).unwrap();

        assert_eq!(encoded, json!("hi"));
    }

    #[test]
    fn control_messages_survive_encode_decode() {
        let original = Message::Control(Control::JoinRoom { name: "lobby".to_string() });
        let decoded = Message::decode(&original.encode().unwrap()).unwrap();

        assert_eq!(original, decoded);
    }
}
