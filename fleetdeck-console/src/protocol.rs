//! Websocket wire format.
//!
//! Every frame is a JSON object with a numeric `type`:
//!
//! | type | direction | payload |
//! |------|-----------|---------|
//! | 0 | out | `request_id`, `method` ("zone.list"), `params` |
//! | 1 | in  | `request_id`, `result` or `error` |
//! | 2 | in  | `name`, `action`, `data` |
//! | 3 | out | ping: `request_id`, `method` = "status.ping" |
//! | 4 | in  | ping reply: `request_id` |

use fleetdeck_core::{Notify, NotifyAction, RemoteError, Request};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Method name of the keepalive ping.
pub const PING_METHOD: &str = "status.ping";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Request,
    Response,
    Notify,
    Ping,
    PingReply,
}

impl MessageType {
    pub fn code(self) -> u8 {
        match self {
            MessageType::Request => 0,
            MessageType::Response => 1,
            MessageType::Notify => 2,
            MessageType::Ping => 3,
            MessageType::PingReply => 4,
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(MessageType::Request),
            1 => Ok(MessageType::Response),
            2 => Ok(MessageType::Notify),
            3 => Ok(MessageType::Ping),
            4 => Ok(MessageType::PingReply),
            other => Err(ProtocolError::UnknownType(other)),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Request => "request",
            MessageType::Response => "response",
            MessageType::Notify => "notify",
            MessageType::Ping => "ping",
            MessageType::PingReply => "ping_reply",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unknown message type {0}")]
    UnknownType(u8),
    #[error("Unexpected {0} frame from server")]
    Unexpected(MessageType),
    #[error("{kind} frame without {field}")]
    MissingField {
        kind: MessageType,
        field: &'static str,
    },
}

// ============================================================================
// OUTGOING
// ============================================================================

/// Frame sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingMessage {
    #[serde(rename = "type")]
    pub kind: u8,
    pub request_id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "JsonValue::is_null")]
    pub params: JsonValue,
}

impl OutgoingMessage {
    pub fn request(request_id: u64, request: &Request) -> Self {
        Self {
            kind: MessageType::Request.code(),
            request_id,
            method: request.endpoint(),
            params: request.params.clone(),
        }
    }

    pub fn ping(request_id: u64) -> Self {
        Self {
            kind: MessageType::Ping.code(),
            request_id,
            method: PING_METHOD.to_string(),
            params: JsonValue::Null,
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// INCOMING
// ============================================================================

/// Frame received from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    Response {
        request_id: u64,
        result: Result<JsonValue, RemoteError>,
    },
    Notify(Notify),
    PingReply {
        request_id: u64,
    },
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    request_id: Option<u64>,
    #[serde(default)]
    result: Option<JsonValue>,
    #[serde(default)]
    error: Option<JsonValue>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    action: Option<NotifyAction>,
    #[serde(default)]
    data: JsonValue,
}

/// Decode and classify one text frame.
pub fn classify(text: &str) -> Result<IncomingMessage, ProtocolError> {
    let frame: RawFrame = serde_json::from_str(text)?;
    let kind = MessageType::try_from(frame.kind)?;
    match kind {
        MessageType::Response => {
            let request_id = frame.request_id.ok_or(ProtocolError::MissingField {
                kind,
                field: "request_id",
            })?;
            let result = match frame.error {
                Some(error) if !error.is_null() => Err(decode_error(error)),
                _ => Ok(frame.result.unwrap_or(JsonValue::Null)),
            };
            Ok(IncomingMessage::Response { request_id, result })
        }
        MessageType::Notify => {
            let name = frame
                .name
                .ok_or(ProtocolError::MissingField { kind, field: "name" })?;
            let action = frame.action.ok_or(ProtocolError::MissingField {
                kind,
                field: "action",
            })?;
            Ok(IncomingMessage::Notify(Notify {
                name,
                action,
                data: frame.data,
            }))
        }
        MessageType::PingReply => {
            let request_id = frame.request_id.ok_or(ProtocolError::MissingField {
                kind,
                field: "request_id",
            })?;
            Ok(IncomingMessage::PingReply { request_id })
        }
        MessageType::Request | MessageType::Ping => Err(ProtocolError::Unexpected(kind)),
    }
}

/// Servers report validation failures as a JSON document serialized into a
/// string. Decode it when possible, otherwise keep the raw text.
fn decode_error(error: JsonValue) -> RemoteError {
    match error {
        JsonValue::String(text) => match serde_json::from_str::<JsonValue>(&text) {
            Ok(payload) => RemoteError::rejected(payload),
            Err(_) => RemoteError::rejected(JsonValue::String(text)),
        },
        payload => RemoteError::rejected(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetdeck_core::Method;
    use serde_json::json;

    #[test]
    fn test_request_frame() {
        let request = Request::list("zone");
        let text = OutgoingMessage::request(7, &request).encode().unwrap();
        let value: JsonValue = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"type": 0, "request_id": 7, "method": "zone.list"}));

        let request = Request::new(Method::Get, "machine", json!({"system_id": "abc"}));
        let value = serde_json::to_value(OutgoingMessage::request(8, &request)).unwrap();
        assert_eq!(value["method"], "machine.get");
        assert_eq!(value["params"], json!({"system_id": "abc"}));
    }

    #[test]
    fn test_ping_frame() {
        let value = serde_json::to_value(OutgoingMessage::ping(3)).unwrap();
        assert_eq!(value, json!({"type": 3, "request_id": 3, "method": "status.ping"}));
    }

    #[test]
    fn test_response_result() {
        let message = classify(r#"{"type":1,"request_id":4,"result":[1,2]}"#).unwrap();
        assert_eq!(
            message,
            IncomingMessage::Response {
                request_id: 4,
                result: Ok(json!([1, 2])),
            }
        );
    }

    #[test]
    fn test_response_null_result() {
        let message = classify(r#"{"type":1,"request_id":4,"result":null}"#).unwrap();
        assert!(matches!(
            message,
            IncomingMessage::Response { result: Ok(JsonValue::Null), .. }
        ));
    }

    #[test]
    fn test_response_error_json_string_decoded() {
        let text = r#"{"type":1,"request_id":5,"error":"{\"name\": [\"Zone with this Name already exists.\"]}"}"#;
        let IncomingMessage::Response { result, .. } = classify(text).unwrap() else {
            panic!("expected response");
        };
        assert_eq!(
            result,
            Err(RemoteError::rejected(
                json!({"name": ["Zone with this Name already exists."]})
            ))
        );
    }

    #[test]
    fn test_response_error_plain_string_kept() {
        let text = r#"{"type":1,"request_id":5,"error":"Permission denied"}"#;
        let IncomingMessage::Response { result, .. } = classify(text).unwrap() else {
            panic!("expected response");
        };
        assert_eq!(result, Err(RemoteError::rejected(json!("Permission denied"))));
    }

    #[test]
    fn test_notify_frame() {
        let text = r#"{"type":2,"name":"zone","action":"delete","data":3}"#;
        assert_eq!(
            classify(text).unwrap(),
            IncomingMessage::Notify(Notify {
                name: "zone".to_string(),
                action: NotifyAction::Delete,
                data: json!(3),
            })
        );
    }

    #[test]
    fn test_ping_reply_frame() {
        assert_eq!(
            classify(r#"{"type":4,"request_id":9,"result":12}"#).unwrap(),
            IncomingMessage::PingReply { request_id: 9 }
        );
    }

    #[test]
    fn test_bad_frames() {
        assert!(matches!(classify("not json"), Err(ProtocolError::Json(_))));
        assert!(matches!(
            classify(r#"{"type":9}"#),
            Err(ProtocolError::UnknownType(9))
        ));
        assert!(matches!(
            classify(r#"{"type":1,"result":1}"#),
            Err(ProtocolError::MissingField { field: "request_id", .. })
        ));
        assert!(matches!(
            classify(r#"{"type":0,"request_id":1,"method":"x.y"}"#),
            Err(ProtocolError::Unexpected(MessageType::Request))
        ));
    }
}
