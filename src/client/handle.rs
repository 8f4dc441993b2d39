//! Cross-thread control of a running client.
//!
//! The loop owns the [`Client`](super::Client) exclusively, so other threads
//! never touch its queues. They push a [`WakeupReason`] into a channel and
//! wake the poll; the loop applies the intent on its next pass.

use std::sync::Arc;
use std::sync::mpsc::Sender;

use mio::Waker;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeupReason {
    Break,
    Connect,
    Disconnect,
}

/// Cloneable, thread-safe remote for a client loop.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    waker: Arc<Waker>,
    sender: Sender<WakeupReason>,
}

impl ClientHandle {
    pub(super) fn new(waker: Arc<Waker>, sender: Sender<WakeupReason>) -> Self {
        Self { waker, sender }
    }

    /// Asks the loop to connect. Same as [`Client::connect`](super::Client::connect).
    pub fn connect(&self) {
        self.signal(WakeupReason::Connect);
    }

    /// Asks the loop to disconnect. Same as [`Client::disconnect`](super::Client::disconnect).
    pub fn disconnect(&self) {
        self.signal(WakeupReason::Disconnect);
    }

    /// Interrupts a blocked `run` and stops `run_forever`.
    pub fn break_run(&self) {
        self.signal(WakeupReason::Break);
    }

    fn signal(&self, reason: WakeupReason) {
        if self.sender.send(reason).is_err() {
            debug!("client dropped, ignoring {reason:?}");
            return;
        }
        if let Err(err) = self.waker.wake() {
            debug!("wakeup failed: {err}");
        }
    }
}
