//! # mbus-client
//!
//! `mbus-client` is a client engine for mbus, a lightweight publish/subscribe
//! plus RPC bus: processes exchange typed commands and events through a
//! central broker over a length-prefixed JSON byte stream.
//!
//! The engine is single-threaded and non-blocking. The application owns a
//! [`client::Client`], queues work through its API (`publish`, `subscribe`,
//! `command`, ...) and drives it with `run`/`run_forever`; outcomes come back
//! as typed statuses through a [`client::ClientHandler`] and per-request
//! callbacks.
//!
//! ## Core Modules
//!
//! - `client`: The connection state machine, request correlation, keepalive and
//!   subscription dispatch.
//! - `config`: Loads client settings from `config/default` and `MBUS__*`
//!   environment variables.
//! - `transport`: Reserved protocol names, the wire envelope, framing and the
//!   non-blocking TCP stream.
//! - `utils`: Clock helpers, error types and logging setup.

pub mod client;
pub mod config;
pub mod transport;
pub mod utils;
