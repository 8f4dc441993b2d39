//! Request queue and correlator
//!
//! A request lives in exactly one of two queues: `staged` (created, not yet
//! framed onto the wire) or `pending` (sent, waiting for the broker's result
//! frame). It leaves the queues exactly once, when it resolves as success,
//! timeout or cancellation.
//!
//! Sequence numbers come from the ring `[SEQUENCE_START, SEQUENCE_END)` and
//! skip values that are still outstanding.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde_json::Value;

use super::handler::{CommandCallback, EventCallback, Message};
use crate::transport::message::{Envelope, MessageType};
use crate::transport::names::{SEQUENCE_END, SEQUENCE_START, SERVER_COMMAND_SUBSCRIBE};
use crate::utils::clock;
use crate::utils::error::ClientError;

/// How a request is resolved once its outcome is known.
pub enum Completion {
    /// The `create` command of the connect handshake.
    Handshake,
    /// Keepalive ping, never reported to the application.
    Ping,
    /// At-most-once publish, reported as soon as it is framed.
    Publish,
    /// At-least-once publish wrapped in a broker command.
    PublishAck { message: Message },
    Subscribe {
        source: String,
        event: String,
        callback: Option<EventCallback>,
    },
    Unsubscribe { source: String, event: String },
    Command(Option<CommandCallback>),
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Completion::Handshake => "Handshake",
            Completion::Ping => "Ping",
            Completion::Publish => "Publish",
            Completion::PublishAck { .. } => "PublishAck",
            Completion::Subscribe { .. } => "Subscribe",
            Completion::Unsubscribe { .. } => "Unsubscribe",
            Completion::Command(_) => "Command",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct Request {
    pub kind: MessageType,
    pub destination: String,
    pub identifier: String,
    pub sequence: u32,
    pub payload: Value,
    pub timeout: Duration,
    pub created_at: Instant,
    pub completion: Completion,
}

impl Request {
    pub fn new(
        kind: MessageType,
        destination: &str,
        identifier: &str,
        sequence: u32,
        payload: Value,
        timeout: Duration,
        completion: Completion,
    ) -> Self {
        Self {
            kind,
            destination: destination.to_string(),
            identifier: identifier.to_string(),
            sequence,
            payload,
            timeout,
            created_at: clock::now(),
            completion,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.created_at + self.timeout
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        clock::reached(self.deadline(), now)
    }

    pub fn envelope(&self) -> Envelope {
        Envelope::request(
            self.kind,
            &self.destination,
            &self.identifier,
            self.sequence,
            self.payload.clone(),
            self.timeout.as_millis() as u64,
        )
    }

    /// Event-kind requests resolve locally when framed; commands wait for a
    /// result frame.
    pub fn expects_result(&self) -> bool {
        self.kind == MessageType::Command
    }
}

#[derive(Debug)]
pub struct RequestQueue {
    staged: VecDeque<Request>,
    pending: VecDeque<Request>,
    next_sequence: u32,
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestQueue {
    pub fn new() -> Self {
        Self {
            staged: VecDeque::new(),
            pending: VecDeque::new(),
            next_sequence: SEQUENCE_START,
        }
    }

    fn in_use(&self, sequence: u32) -> bool {
        self.staged
            .iter()
            .chain(self.pending.iter())
            .any(|r| r.sequence == sequence)
    }

    fn advance(&mut self) {
        self.next_sequence += 1;
        if self.next_sequence >= SEQUENCE_END {
            self.next_sequence = SEQUENCE_START;
        }
    }

    /// Hands out the next free sequence number.
    pub fn allocate_sequence(&mut self) -> Result<u32, ClientError> {
        for _ in SEQUENCE_START..SEQUENCE_END {
            let candidate = self.next_sequence;
            self.advance();
            if !self.in_use(candidate) {
                return Ok(candidate);
            }
        }
        Err(ClientError::SequenceExhausted)
    }

    pub fn stage(&mut self, request: Request) {
        self.staged.push_back(request);
    }

    pub fn pop_staged(&mut self) -> Option<Request> {
        self.staged.pop_front()
    }

    pub fn push_pending(&mut self, request: Request) {
        self.pending.push_back(request);
    }

    /// Removes the pending request answered by a result frame.
    pub fn resolve(&mut self, sequence: u32) -> Option<Request> {
        let index = self.pending.iter().position(|r| r.sequence == sequence)?;
        self.pending.remove(index)
    }

    /// Removes and returns every staged or pending request whose deadline
    /// has been reached, staged first, each in submission order.
    pub fn take_expired(&mut self, now: Instant) -> Vec<Request> {
        let mut expired = Vec::new();
        for queue in [&mut self.staged, &mut self.pending] {
            let mut kept = VecDeque::with_capacity(queue.len());
            for request in queue.drain(..) {
                if request.is_expired(now) {
                    expired.push(request);
                } else {
                    kept.push_back(request);
                }
            }
            *queue = kept;
        }
        expired
    }

    /// Earliest deadline among all outstanding requests.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.staged
            .iter()
            .chain(self.pending.iter())
            .map(Request::deadline)
            .min()
    }

    /// Empties both queues and rewinds the sequence ring.
    pub fn reset(&mut self) -> Vec<Request> {
        let mut drained: Vec<Request> = self.staged.drain(..).collect();
        drained.extend(self.pending.drain(..));
        self.next_sequence = SEQUENCE_START;
        drained
    }

    /// Whether a subscribe for `(source, event)` is still awaiting its result.
    pub fn has_subscribe_in_flight(&self, source: &str, event: &str) -> bool {
        self.staged.iter().chain(self.pending.iter()).any(|r| {
            r.identifier == SERVER_COMMAND_SUBSCRIBE
                && matches!(
                    &r.completion,
                    Completion::Subscribe { source: s, event: e, .. } if s == source && e == event
                )
        })
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty() && self.pending.is_empty()
    }

    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn sequences(&self) -> impl Iterator<Item = u32> + '_ {
        self.staged
            .iter()
            .chain(self.pending.iter())
            .map(|r| r.sequence)
    }
}
