//! Wire envelope
//!
//! Every frame on the stream carries one JSON object with a fixed set of
//! tag keys. Outbound requests fill `destination`, `identifier`, `sequence`,
//! `payload` and `timeout`; the broker adds `source` on events and answers
//! commands with a `result` frame carrying the same `sequence` plus a
//! numeric status code (some brokers spell that key `result`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::names;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "org.mbus.method.type.command")]
    Command,
    #[serde(rename = "org.mbus.method.type.event")]
    Event,
    #[serde(rename = "org.mbus.method.type.result")]
    Result,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Command => names::METHOD_TYPE_COMMAND,
            MessageType::Event => names::METHOD_TYPE_EVENT,
            MessageType::Result => names::METHOD_TYPE_RESULT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u32>,
    #[serde(default)]
    pub payload: Value,
    /// Request timeout in milliseconds, informational for the broker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, alias = "result", skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
}

impl Envelope {
    /// Builds an outbound request envelope.
    pub fn request(
        kind: MessageType,
        destination: &str,
        identifier: &str,
        sequence: u32,
        payload: Value,
        timeout_ms: u64,
    ) -> Self {
        Self {
            kind,
            source: None,
            destination: Some(destination.to_string()),
            identifier: Some(identifier.to_string()),
            sequence: Some(sequence),
            payload,
            timeout: Some(timeout_ms),
            status: None,
        }
    }

    /// Builds a result envelope answering `sequence`.
    pub fn result(sequence: u32, status: i64, payload: Value) -> Self {
        Self {
            kind: MessageType::Result,
            source: None,
            destination: None,
            identifier: None,
            sequence: Some(sequence),
            payload,
            timeout: None,
            status: Some(status),
        }
    }

    /// Builds an event envelope as a broker would deliver it.
    pub fn event(source: &str, destination: &str, identifier: &str, payload: Value) -> Self {
        Self {
            kind: MessageType::Event,
            source: Some(source.to_string()),
            destination: Some(destination.to_string()),
            identifier: Some(identifier.to_string()),
            sequence: None,
            payload,
            timeout: None,
            status: None,
        }
    }
}
