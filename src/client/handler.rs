//! Notification surface of the client.
//!
//! Long-lived hooks live on a [`ClientHandler`] installed at construction.
//! Per-request completions are closures: subscription callbacks fire for
//! every matching event, command callbacks are `FnOnce` and therefore run at
//! most once by construction.

use serde_json::Value;

use super::Client;
use super::status::{
    CommandStatus, ConnectStatus, DisconnectStatus, PublishStatus, RegisterStatus,
    SubscribeStatus, UnregisterStatus, UnsubscribeStatus,
};

/// An event as seen by the application.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub source: String,
    pub destination: String,
    pub identifier: String,
    pub payload: Value,
}

/// What came back for a command: the request that was sent and, on
/// `CommandStatus::Success`, the broker's result code and payload.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandReply {
    pub destination: String,
    pub command: String,
    pub request: Value,
    pub result: Option<i64>,
    pub response: Option<Value>,
}

impl CommandReply {
    /// `true` when the broker answered with result code zero.
    pub fn is_ok(&self) -> bool {
        self.result == Some(0)
    }
}

/// Invoked for every event that matches a subscription.
pub type EventCallback = Box<dyn FnMut(&mut Client, &Message) + Send>;

/// Invoked once when a command resolves.
pub type CommandCallback = Box<dyn FnOnce(&mut Client, &CommandReply, CommandStatus) + Send>;

/// Connection-wide notification hooks. Every method defaults to a no-op.
///
/// Hooks run on the loop's own flow and may call back into the client to
/// queue more work (`subscribe`, `publish`, `disconnect`, ...). They must
/// not call [`Client::run`].
#[allow(unused_variables)]
pub trait ClientHandler: Send {
    fn on_connect(&mut self, client: &mut Client, status: ConnectStatus) {}

    fn on_disconnect(&mut self, client: &mut Client, status: DisconnectStatus) {}

    /// Events that no subscription with a callback claimed.
    fn on_message(&mut self, client: &mut Client, message: &Message) {}

    fn on_publish(&mut self, client: &mut Client, message: &Message, status: PublishStatus) {}

    fn on_subscribe(&mut self, client: &mut Client, source: &str, event: &str, status: SubscribeStatus) {}

    fn on_unsubscribe(
        &mut self,
        client: &mut Client,
        source: &str,
        event: &str,
        status: UnsubscribeStatus,
    ) {
    }

    /// Reserved for command registration, which this client does not offer.
    fn on_registered(&mut self, client: &mut Client, command: &str, status: RegisterStatus) {}

    /// Reserved for command registration, which this client does not offer.
    fn on_unregistered(&mut self, client: &mut Client, command: &str, status: UnregisterStatus) {}
}

/// Handler that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl ClientHandler for NoopHandler {}
