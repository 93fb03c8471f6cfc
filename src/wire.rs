//! The DevTools wire format: outbound command envelopes and just enough of
//! the inbound frame to correlate a response with its call.
//!
//! Field names are camelCase and match CDP verbatim (`params`, `id`,
//! `result`). Numeric parameters are serialized as JSON numbers, never as
//! strings.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CdpError, CdpResult};

/// An outbound CDP command. `id` is assigned exactly once, by the
/// [`crate::conn::Connection`] at enqueue time.
#[derive(Debug, Serialize)]
pub struct OutboundMessage {
    pub id: u64,
    pub method: &'static str,
    pub params: Value,
}

impl OutboundMessage {
    pub fn to_wire_text(&self) -> CdpResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Just enough of an inbound frame to dispatch it: either a command
/// response (has `id`) or an event (no `id`), which the core ignores.
#[derive(Debug)]
pub enum InboundFrame {
    Response { id: u64, payload: RawResponse },
    Event,
}

/// The raw decoded shape of a command response, before the caller decodes
/// `result` into a concrete type.
#[derive(Debug, Deserialize)]
pub struct RawResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ProtocolError>,
}

#[derive(Debug, Deserialize)]
pub struct ProtocolError {
    pub code: i64,
    pub message: String,
}

/// Parses one inbound wire frame, extracting only `id` and deferring full
/// decode of `result`/`error` to [`RawResponse`]. Unknown fields and
/// unrecognized event shapes are tolerated silently, per the design's
/// requirement that the receiver never fail on an unknown frame.
pub fn parse_inbound(text: &str) -> CdpResult<InboundFrame> {
    let value: Value = serde_json::from_str(text)?;
    match value.get("id").and_then(Value::as_u64) {
        Some(id) => {
            let payload: RawResponse = serde_json::from_value(value)?;
            Ok(InboundFrame::Response { id, payload })
        }
        None => Ok(InboundFrame::Event),
    }
}

impl RawResponse {
    /// Decodes `result` into `T`, surfacing a protocol error if Chromium
    /// returned one instead of a result.
    pub fn into_result<T: for<'de> Deserialize<'de>>(self, method: &'static str) -> CdpResult<T> {
        if let Some(err) = self.error {
            return Err(CdpError::Protocol {
                code: err.code,
                message: err.message,
            });
        }
        let result = self.result.ok_or_else(|| CdpError::UnexpectedResponse {
            method,
            detail: "response carried neither result nor error".to_string(),
        })?;
        serde_json::from_value(result).map_err(|e| CdpError::UnexpectedResponse {
            method,
            detail: e.to_string(),
        })
    }
}

// Known response payload shapes, decoded only where the render pipeline
// needs them (spec §4.2).

#[derive(Debug, Deserialize)]
pub struct CreateTargetResult {
    #[serde(rename = "targetId")]
    pub target_id: String,
}

#[derive(Debug, Deserialize)]
pub struct FrameTreeResult {
    #[serde(rename = "frameTree")]
    pub frame_tree: FrameTree,
}

#[derive(Debug, Deserialize)]
pub struct FrameTree {
    pub frame: Frame,
}

#[derive(Debug, Deserialize)]
pub struct Frame {
    pub id: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct PrintToPdfResult {
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub stream: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IoReadResult {
    #[serde(default, rename = "base64Encoded")]
    pub base64_encoded: bool,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub eof: bool,
}

#[derive(Debug, Deserialize)]
pub struct EvaluateResult {
    pub result: EvaluateValue,
    #[serde(default, rename = "wasThrown")]
    pub was_thrown: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct EvaluateValue {
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_frame_extracts_id() {
        let frame = parse_inbound(r#"{"id":7,"result":{"ok":true}}"#).unwrap();
        match frame {
            InboundFrame::Response { id, .. } => assert_eq!(id, 7),
            InboundFrame::Event => panic!("expected response"),
        }
    }

    #[test]
    fn event_frame_without_id_is_ignored() {
        let frame = parse_inbound(r#"{"method":"Target.targetCreated","params":{}}"#).unwrap();
        assert!(matches!(frame, InboundFrame::Event));
    }

    #[test]
    fn unknown_fields_do_not_fail_decode() {
        let frame =
            parse_inbound(r#"{"id":1,"result":{"x":1},"sessionId":"abc","extra":null}"#).unwrap();
        assert!(matches!(frame, InboundFrame::Response { id: 1, .. }));
    }

    #[test]
    fn protocol_error_surfaces_as_cdp_error() {
        let frame = parse_inbound(r#"{"id":2,"error":{"code":-32000,"message":"boom"}}"#).unwrap();
        let InboundFrame::Response { payload, .. } = frame else {
            panic!("expected response")
        };
        let err = payload.into_result::<Value>("Test.method").unwrap_err();
        match err {
            CdpError::Protocol { code, message } => {
                assert_eq!(code, -32000);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn outbound_message_serializes_params_under_literal_key() {
        let msg = OutboundMessage {
            id: 3,
            method: "Page.printToPDF",
            params: serde_json::json!({"landscape": false, "paperWidth": 8.5}),
        };
        let text = msg.to_wire_text().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["id"], 3);
        assert_eq!(value["method"], "Page.printToPDF");
        assert_eq!(value["params"]["paperWidth"], 8.5);
    }
}
