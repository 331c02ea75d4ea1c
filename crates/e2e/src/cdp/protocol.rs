//! CDP protocol message definitions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// CDP request message.
#[derive(Debug, Serialize)]
pub struct CdpRequest {
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// Any message received from the browser: a response when `id` is set,
/// an event otherwise.
#[derive(Debug, Deserialize)]
pub struct CdpResponse {
    pub id: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<CdpErrorResponse>,
    pub method: Option<String>,
    pub params: Option<Value>,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// CDP error in response.
#[derive(Debug, Deserialize)]
pub struct CdpErrorResponse {
    pub code: i64,
    pub message: String,
}

/// Protocol event pushed by the browser.
#[derive(Debug, Clone)]
pub struct CdpEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

impl CdpResponse {
    /// Split off the event part of an unsolicited message.
    pub fn into_event(self) -> Option<CdpEvent> {
        let method = self.method?;
        Some(CdpEvent {
            method,
            params: self.params.unwrap_or(Value::Null),
            session_id: self.session_id,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MouseEventType {
    MousePressed,
    MouseReleased,
    MouseMoved,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MouseButton {
    None,
    Left,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_omits_empty_fields() {
        let req = CdpRequest {
            id: 7,
            method: "Page.enable".to_string(),
            params: None,
            session_id: None,
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"id": 7, "method": "Page.enable"})
        );
    }

    #[test]
    fn test_event_message_becomes_event() {
        let raw = r#"{"method":"Runtime.exceptionThrown","params":{"timestamp":1},"sessionId":"S1"}"#;
        let msg: CdpResponse = serde_json::from_str(raw).unwrap();
        assert!(msg.id.is_none());
        let event = msg.into_event().unwrap();
        assert_eq!(event.method, "Runtime.exceptionThrown");
        assert_eq!(event.session_id.as_deref(), Some("S1"));
        assert_eq!(event.params["timestamp"], 1);
    }

    #[test]
    fn test_mouse_event_names() {
        assert_eq!(
            serde_json::to_value(MouseEventType::MousePressed).unwrap(),
            json!("mousePressed")
        );
        assert_eq!(serde_json::to_value(MouseButton::Left).unwrap(), json!("left"));
    }
}
