//! Control messages pages can post to the worker.

use serde_json::Value;

pub const SKIP_WAITING: &str = "SKIP_WAITING";

/// Recognized message tags. Anything else is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Take over immediately without waiting for pages to release the old version.
    SkipWaiting,
}

impl ControlMessage {
    /// Read the `type` field of an object payload.
    pub fn parse(message: &Value) -> Option<Self> {
        match message.get("type").and_then(Value::as_str)? {
            SKIP_WAITING => Some(ControlMessage::SkipWaiting),
            _ => None,
        }
    }
}
