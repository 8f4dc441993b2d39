//! The `error` module defines the error types used within `mbus-client`.
//!
//! Only usage errors travel through these types: a call that is rejected
//! synchronously returns a [`ClientError`]. Outcomes that happen later on the
//! wire (timeouts, cancellations, broker failures) are reported through the
//! typed status enums in [`crate::client::status`] instead.

use thiserror::Error;

use crate::client::ClientState;

/// Errors raised while framing or deframing wire envelopes.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A length prefix announced a body larger than the configured bound.
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    /// The frame body is not a valid envelope.
    #[error("invalid envelope: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors returned synchronously by the public client API.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client state is not connected: {0}")]
    NotConnected(ClientState),

    #[error("client state is not connecting: {0}")]
    NotConnecting(ClientState),

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("subscription already exists for source: {source_id}, event: {event}")]
    AlreadySubscribed { source_id: String, event: String },

    #[error("can not find subscription for source: {source_id}, event: {event}")]
    NotSubscribed { source_id: String, event: String },

    #[error("invalid server protocol: {0}")]
    InvalidProtocol(String),

    #[error("invalid options: {0}")]
    InvalidOptions(&'static str),

    #[error("no free sequence number, every slot is outstanding")]
    SequenceExhausted,

    #[error("{0} is not supported")]
    Unsupported(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),
}
