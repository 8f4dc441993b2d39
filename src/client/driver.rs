//! Event loop of the client.
//!
//! One call to [`Client::run`] is one bounded iteration: pre-work for the
//! current state, a single readiness wait, socket service, inbound dispatch,
//! keepalive, the timeout sweep, and finally staged requests onto the wire.
//! Sockets are registered edge-triggered, so every read and write drains
//! until the kernel reports `WouldBlock`.

use std::io::ErrorKind;
use std::time::{Duration, Instant};

use mio::Interest;
use tracing::{debug, error, info, warn};

use super::engine::{Client, Reply, SOCKET, WAKER, connect_status};
use super::handle::WakeupReason;
use super::handler::Message;
use super::keepalive::KeepaliveAction;
use super::status::{ClientState, CommandStatus, ConnectStatus, DisconnectStatus};
use crate::transport::codec::encode_frame;
use crate::transport::message::{Envelope, MessageType};
use crate::transport::names::{SERVER_EVENT_PONG, SERVER_IDENTIFIER};
use crate::transport::socket::{ConnectProbe, ReadOutcome};
use crate::utils::clock;
use crate::utils::error::{ClientError, CodecError};

/// Most bytes taken off the socket in one loop iteration.
const READ_BUDGET: usize = 256 * 1024;

impl Client {
    /// Runs one loop iteration, waiting at most `timeout` (or the configured
    /// run timeout) for socket or wakeup activity.
    ///
    /// Errors only when the readiness facility itself fails; connection
    /// problems are reported through the handler.
    pub fn run(&mut self, timeout: Option<Duration>) -> Result<(), ClientError> {
        self.apply_wakeups();

        match self.state {
            ClientState::Connecting if self.connection.is_none() => {
                let now = clock::now();
                if self.attempt_due(now) {
                    self.start_connect(now);
                }
            }
            ClientState::Disconnecting => {
                self.finish_disconnect();
                return Ok(());
            }
            _ => {}
        }

        self.update_interest()?;

        let mut budget = self.wait_budget(clock::now());
        if let Some(timeout) = timeout {
            budget = budget.min(timeout);
        }

        if let Err(err) = self.poll.poll(&mut self.events, Some(budget)) {
            if err.kind() != ErrorKind::Interrupted {
                return Err(err.into());
            }
        }

        let mut woken = false;
        let mut readable = false;
        let mut writable = false;
        for event in self.events.iter() {
            match event.token() {
                WAKER => woken = true,
                SOCKET => {
                    readable |= event.is_readable() || event.is_read_closed() || event.is_error();
                    writable |= event.is_writable() || event.is_error();
                }
                _ => {}
            }
        }

        // edge-triggered: leftovers from a limited read get no new event
        readable |= std::mem::take(&mut self.read_backlog);

        if woken {
            self.apply_wakeups();
        }
        if self.state == ClientState::Disconnecting {
            return Ok(());
        }

        self.service_socket(readable, writable);
        self.dispatch_inbound();

        let now = clock::now();
        self.check_connect_timeout(now);
        self.check_keepalive(now);
        self.sweep_timeouts(now);
        self.flush_staged();
        Ok(())
    }

    /// Repeats [`Client::run`] until a break is requested or the client has
    /// settled in `Disconnected` with nothing left to retry.
    ///
    /// A break requested before the call is discarded; only breaks that
    /// arrive while it runs stop it.
    pub fn run_forever(&mut self) -> Result<(), ClientError> {
        self.break_requested = false;
        loop {
            self.run(None)?;
            if std::mem::take(&mut self.break_requested) {
                debug!("run loop interrupted");
                return Ok(());
            }
            if self.state == ClientState::Disconnected && !self.wanted {
                return Ok(());
            }
        }
    }

    /// Applies intents pushed by [`ClientHandle`](super::ClientHandle)s.
    fn apply_wakeups(&mut self) {
        loop {
            match self.wakeup_rx.try_recv() {
                Ok(WakeupReason::Break) => self.break_requested = true,
                Ok(WakeupReason::Connect) => {
                    let _ = self.connect();
                }
                Ok(WakeupReason::Disconnect) => {
                    let _ = self.disconnect();
                }
                Err(_) => break,
            }
        }
    }

    fn attempt_due(&self, now: Instant) -> bool {
        match self.last_attempt {
            Some(last) => clock::reached(last + self.options.connect_interval, now),
            None => true,
        }
    }

    fn update_interest(&mut self) -> Result<(), ClientError> {
        let Some(connection) = self.connection.as_mut() else {
            return Ok(());
        };
        let interest = if !connection.is_connected() {
            Interest::WRITABLE
        } else if !self.outbound.is_empty() {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        connection.update_interest(self.poll.registry(), SOCKET, interest)?;
        Ok(())
    }

    /// Time to block in the next wait: up to the run timeout, cut short by
    /// the nearest deadline of any component.
    fn wait_budget(&self, now: Instant) -> Duration {
        let ceiling = self.options.run_timeout;
        let deadline = match self.state {
            ClientState::Disconnecting => return Duration::ZERO,
            ClientState::Disconnected => None,
            ClientState::Connecting => match &self.connection {
                None => match self.last_attempt {
                    Some(last) => Some(last + self.options.connect_interval),
                    None => return Duration::ZERO,
                },
                Some(connection) if !connection.is_connected() => self
                    .last_attempt
                    .map(|last| last + self.options.connect_timeout),
                Some(_) => None,
            },
            ClientState::Connected => self.keepalive.next_deadline(),
        };
        let sendable = self
            .connection
            .as_ref()
            .is_some_and(|connection| connection.is_connected());
        if sendable && (self.read_backlog || self.queue.staged_len() > 0) {
            return Duration::ZERO;
        }
        match clock::earliest(deadline, self.queue.next_deadline()) {
            Some(deadline) => clock::until(deadline, now).min(ceiling),
            None => ceiling,
        }
    }

    fn service_socket(&mut self, readable: bool, writable: bool) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };

        if !connection.is_connected() {
            if !writable {
                return;
            }
            match connection.probe() {
                ConnectProbe::Connected => {
                    info!("socket connected, sending handshake");
                    if let Err(err) = self.issue_handshake() {
                        warn!("can not queue handshake: {err}");
                        self.connect_failed(ConnectStatus::InternalError);
                    }
                }
                ConnectProbe::Pending => {}
                ConnectProbe::Failed(err) => {
                    debug!("connect error: {err}");
                    self.connect_failed(connect_status(&err));
                }
            }
            return;
        }

        if readable {
            match connection.read_available(self.decoder.buffer_mut(), READ_BUDGET) {
                Ok(ReadOutcome::Data(n)) => debug!("read {n} bytes"),
                Ok(ReadOutcome::Limited(n)) => {
                    debug!("read {n} bytes, more pending");
                    self.read_backlog = true;
                }
                Ok(ReadOutcome::Closed) => {
                    // frames that arrived ahead of the close are still delivered
                    self.dispatch_inbound();
                    info!("connection closed by peer");
                    self.connection_lost(DisconnectStatus::ConnectionClosed);
                    return;
                }
                Err(err) => {
                    warn!("read failed: {err}");
                    self.connection_lost(DisconnectStatus::ConnectionClosed);
                    return;
                }
            }
        }
        if writable {
            self.write_outbound();
        }
    }

    fn write_outbound(&mut self) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        if !connection.is_connected() || self.outbound.is_empty() {
            return;
        }
        match connection.write_pending(&mut self.outbound) {
            Ok(n) => debug!("wrote {n} bytes, {} buffered", self.outbound.len()),
            Err(err) => {
                warn!("write failed: {err}");
                self.connection_lost(DisconnectStatus::ConnectionClosed);
            }
        }
    }

    /// Decodes and dispatches every complete frame in the inbound buffer.
    fn dispatch_inbound(&mut self) {
        loop {
            if self.connection.is_none() {
                return;
            }
            let envelope = match self.decoder.next_frame() {
                Ok(Some(envelope)) => envelope,
                Ok(None) => return,
                Err(CodecError::Json(err)) => {
                    warn!("dropping malformed frame: {err}");
                    continue;
                }
                Err(err @ CodecError::FrameTooLarge { .. }) => {
                    error!("{err}, resetting connection");
                    self.connection_lost(DisconnectStatus::InternalError);
                    return;
                }
            };
            match envelope.kind {
                MessageType::Result => self.handle_result(envelope),
                MessageType::Event => self.handle_event(envelope),
                MessageType::Command => {
                    warn!(
                        "dropping inbound command {}",
                        envelope.identifier.unwrap_or_default()
                    );
                }
            }
        }
    }

    fn handle_result(&mut self, envelope: Envelope) {
        let Some(sequence) = envelope.sequence else {
            warn!("result without sequence");
            return;
        };
        let Some(request) = self.queue.resolve(sequence) else {
            warn!("no pending request for sequence: {sequence}");
            return;
        };
        let reply = Reply {
            result: envelope.status,
            payload: envelope.payload,
        };
        self.complete(request, CommandStatus::Success, Some(reply));
    }

    fn handle_event(&mut self, envelope: Envelope) {
        let (Some(source), Some(identifier)) = (envelope.source, envelope.identifier) else {
            warn!("event without source or identifier");
            return;
        };
        if source == SERVER_IDENTIFIER && identifier == SERVER_EVENT_PONG {
            debug!("pong received");
            self.keepalive.pong_received(clock::now());
            return;
        }
        let message = Message {
            source,
            destination: envelope.destination.unwrap_or_default(),
            identifier,
            payload: envelope.payload,
        };

        let claimed = self
            .subscriptions
            .find_match(&message.source, &message.identifier)
            .and_then(|index| {
                let subscription = self.subscriptions.get(index)?;
                let key = (subscription.source.clone(), subscription.event.clone());
                let callback = self.subscriptions.take_callback(index)?;
                Some((key, callback))
            });
        match claimed {
            Some(((source, event), mut callback)) => {
                callback(self, &message);
                self.subscriptions.restore_callback(&source, &event, callback);
            }
            None => self.with_handler(|handler, client| handler.on_message(client, &message)),
        }
    }

    fn check_connect_timeout(&mut self, now: Instant) {
        if self.state != ClientState::Connecting {
            return;
        }
        let connecting = self
            .connection
            .as_ref()
            .is_some_and(|connection| !connection.is_connected());
        let expired = self
            .last_attempt
            .is_some_and(|last| clock::reached(last + self.options.connect_timeout, now));
        if connecting && expired {
            self.connect_failed(ConnectStatus::Timeout);
        }
    }

    fn check_keepalive(&mut self, now: Instant) {
        if self.state != ClientState::Connected {
            return;
        }
        match self.keepalive.poll(now) {
            KeepaliveAction::Idle => {}
            KeepaliveAction::SendPing => self.send_ping(),
            KeepaliveAction::Expired { missed } => {
                error!("missed {missed} pongs, dropping connection");
                self.connection_lost(DisconnectStatus::PingTimeout);
            }
        }
    }

    fn sweep_timeouts(&mut self, now: Instant) {
        for request in self.queue.take_expired(now) {
            debug!("request {} timed out", request.sequence);
            self.complete(request, CommandStatus::Timeout, None);
        }
    }

    /// Frames every staged request; events resolve as sent, commands wait
    /// for their result.
    fn flush_staged(&mut self) {
        loop {
            let sendable = matches!(self.state, ClientState::Connecting | ClientState::Connected)
                && self
                    .connection
                    .as_ref()
                    .is_some_and(|connection| connection.is_connected());
            if !sendable {
                break;
            }
            let Some(request) = self.queue.pop_staged() else {
                break;
            };
            if let Err(err) = encode_frame(&request.envelope(), &mut self.outbound) {
                warn!("can not encode request {}: {err}", request.sequence);
                self.complete(request, CommandStatus::InternalError, None);
                continue;
            }
            debug!("sent {} sequence: {}", request.identifier, request.sequence);
            if request.expects_result() {
                self.queue.push_pending(request);
            } else {
                self.complete(request, CommandStatus::Success, None);
            }
        }
        self.write_outbound();
    }
}
