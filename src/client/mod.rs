//! The `client` module implements the mbus client engine.
//!
//! A [`Client`] owns one broker connection and everything attached to it:
//! the staged and pending request queues, the subscription registry and the
//! keepalive monitor. The application drives it by calling [`Client::run`]
//! (or [`Client::run_forever`]) and receives outcomes through a
//! [`ClientHandler`] and per-request callbacks. Other threads steer a running
//! loop through a [`ClientHandle`].

mod driver;
mod engine;
pub mod handle;
pub mod handler;
pub mod keepalive;
pub mod request;
pub mod status;
pub mod subscription;

pub use engine::{Client, ClientOptions};
pub use handle::{ClientHandle, WakeupReason};
pub use handler::{ClientHandler, CommandCallback, CommandReply, EventCallback, Message, NoopHandler};
pub use keepalive::PingParams;
pub use status::{
    ClientState, CommandStatus, ConnectStatus, DisconnectStatus, PublishStatus, QoS,
    RegisterStatus, SubscribeStatus, UnregisterStatus, UnsubscribeStatus,
};

#[cfg(test)]
mod fake_broker;
