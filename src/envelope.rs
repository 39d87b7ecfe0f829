//! Message envelopes carried by the realtime client.
//!
//! Anything the client can send or receive implements [`WireMessage`]: it is
//! JSON on the wire, it knows how to stamp itself at send time, and it knows
//! how to wrap a frame that failed to parse so that the frame still reaches
//! the caller instead of being dropped.
//!
//! [`Envelope`] is the generic `{type, payload?, ts?}` shape. The chat
//! envelope lives in [`crate::chat::message`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type tag used for frames that could not be decoded.
pub const RAW_TYPE: &str = "raw";

/// Format a timestamp the way the web clients do (`2026-01-18T00:00:00.000Z`).
#[must_use]
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Truncate `text` to at most `max` bytes on a char boundary, for logging.
pub(crate) fn preview(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let end = (0..=max).rev().find(|&i| text.is_char_boundary(i)).unwrap_or(0);
    &text[..end]
}

/// A JSON message that can travel through [`crate::RealtimeClient`].
pub trait WireMessage: Serialize + DeserializeOwned + Send + 'static {
    /// Fill the sender-owned fields right before transmission.
    fn stamp(&mut self, now: DateTime<Utc>);

    /// Wrap a frame body that did not decode as `Self`.
    fn raw(text: String, received_at: DateTime<Utc>) -> Self;

    /// Decode a frame, falling back to [`WireMessage::raw`] on parse failure.
    fn decode(text: &str) -> Self
    where
        Self: Sized,
    {
        match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                log::debug!(
                    "[Realtime] Undecodable frame ({}), passing through raw: {}",
                    e,
                    preview(text, 100)
                );
                Self::raw(text.to_string(), Utc::now())
            }
        }
    }
}

/// Generic `{type, payload?, ts?}` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type tag.
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-specific payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// ISO-8601 send time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
}

impl Envelope {
    /// Envelope with a payload and no timestamp.
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload: Some(payload),
            ts: None,
        }
    }

    /// Envelope carrying only a type tag.
    pub fn bare(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: None,
            ts: None,
        }
    }

    /// Whether this envelope is a raw passthrough of an undecodable frame.
    #[must_use]
    pub fn is_raw(&self) -> bool {
        self.kind == RAW_TYPE
    }

    /// Deserialize the payload into a concrete type.
    ///
    /// # Errors
    ///
    /// Fails if the payload is absent or has the wrong shape.
    pub fn payload_as<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        let payload = self
            .payload
            .clone()
            .ok_or_else(|| anyhow::anyhow!("envelope '{}' has no payload", self.kind))?;
        Ok(serde_json::from_value(payload)?)
    }
}

impl WireMessage for Envelope {
    fn stamp(&mut self, now: DateTime<Utc>) {
        if self.ts.is_none() {
            self.ts = Some(iso_timestamp(now));
        }
    }

    fn raw(text: String, received_at: DateTime<Utc>) -> Self {
        Self {
            kind: RAW_TYPE.to_string(),
            payload: Some(Value::String(text)),
            ts: Some(iso_timestamp(received_at)),
        }
    }
}
