//! Wire frame model.
//!
//! Every message on the persistent connection is one JSON object of the form
//! `{"type": ..., "body": ...}`. Three type values carry protocol meaning
//! (`connect`, `disconnect`, `channel`); every other type is a free-form
//! application event delivered to whoever subscribed to it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StreamError;

/// Reserved frame type: open a channel.
pub const TYPE_CONNECT: &str = "connect";
/// Reserved frame type: close a channel.
pub const TYPE_DISCONNECT: &str = "disconnect";
/// Reserved frame type: channel-scoped traffic.
pub const TYPE_CHANNEL: &str = "channel";

/// One message unit on the wire: a type tag plus a free-form body.
///
/// Inbound frames without a body are tolerated (`body` defaults to null);
/// frames without a type do not parse and are dropped by the stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Event type; drives routing.
    #[serde(rename = "type")]
    pub ty: String,
    /// Payload.
    #[serde(default)]
    pub body: Value,
}

impl Frame {
    /// A free-form application event frame.
    pub fn event(ty: impl Into<String>, body: Value) -> Self {
        Self { ty: ty.into(), body }
    }

    /// The frame that opens a channel: `{type:"connect", body:{channel, id, params?}}`.
    ///
    /// `params` is omitted from the body entirely when absent.
    pub fn connect(channel: &str, id: u64, params: Option<Value>) -> Self {
        let mut body = serde_json::json!({
            "channel": channel,
            "id": id,
        });
        if let Some(params) = params {
            body["params"] = params;
        }
        Self::event(TYPE_CONNECT, body)
    }

    /// The frame that closes a channel: `{type:"disconnect", body:{id}}`.
    pub fn disconnect(id: u64) -> Self {
        Self::event(TYPE_DISCONNECT, serde_json::json!({ "id": id }))
    }

    /// A channel-scoped event frame: `{type:"channel", body:{id, type, body}}`.
    pub fn channel(id: u64, ty: impl Into<String>, body: Value) -> Self {
        let ty = ty.into();
        Self::event(
            TYPE_CHANNEL,
            serde_json::json!({
                "id": id,
                "type": ty,
                "body": body,
            }),
        )
    }

    /// Parse one raw wire message.
    pub fn parse(text: &str) -> Result<Self, StreamError> {
        serde_json::from_str(text).map_err(|e| StreamError::MalformedFrame {
            detail: e.to_string(),
        })
    }
}

/// Body of a `"channel"` frame: the target channel id plus the inner event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelEnvelope {
    /// Channel the inner event is addressed to.
    pub id: u64,
    /// Inner event type.
    #[serde(rename = "type")]
    pub ty: String,
    /// Inner event payload.
    #[serde(default)]
    pub body: Value,
}

impl ChannelEnvelope {
    /// Decode a `"channel"` frame body. Returns `None` when the body does
    /// not carry the expected shape.
    pub fn from_body(body: &Value) -> Option<Self> {
        serde_json::from_value(body.clone()).ok()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
