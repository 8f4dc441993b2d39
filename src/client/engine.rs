//! Connection state machine and public API of the mbus client.
//!
//! Public calls only validate and queue work; sockets are touched exclusively
//! by [`Client::run`]. Every request is resolved exactly once, through
//! [`Client::complete`], whether it succeeds, times out or is canceled by a
//! teardown.

use std::io::{self, ErrorKind};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use mio::{Events, Poll, Token, Waker};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::handle::{ClientHandle, WakeupReason};
use super::handler::{ClientHandler, CommandCallback, CommandReply, EventCallback, Message};
use super::keepalive::{Keepalive, PingParams};
use super::request::{Completion, Request, RequestQueue};
use super::status::{
    ClientState, CommandStatus, ConnectStatus, DisconnectStatus, PublishStatus, QoS,
    SubscribeStatus, UnsubscribeStatus,
};
use super::subscription::{Subscription, SubscriptionRegistry};
use crate::transport::codec::{DEFAULT_MAX_FRAME_SIZE, FrameDecoder};
use crate::transport::message::MessageType;
use crate::transport::names::{
    COMPRESSION_NONE, EVENT_DESTINATION_SUBSCRIBERS, EVENT_SOURCE_ALL, SERVER_COMMAND_CREATE,
    SERVER_COMMAND_EVENT, SERVER_COMMAND_SUBSCRIBE, SERVER_COMMAND_UNSUBSCRIBE,
    SERVER_EVENT_PING, SERVER_IDENTIFIER, is_builtin_command,
};
use crate::transport::socket::{self, Connection};
use crate::utils::clock;
use crate::utils::error::ClientError;

pub(super) const WAKER: Token = Token(0);
pub(super) const SOCKET: Token = Token(1);

const EVENT_CAPACITY: usize = 16;

/// Client configuration. Fixed once the client is built.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    /// Requested client identifier; the broker assigns one when `None`.
    pub identifier: Option<String>,
    pub server_protocol: String,
    pub server_address: String,
    pub server_port: u16,
    pub connect_timeout: Duration,
    /// Delay between connect attempts; zero disables reconnection.
    pub connect_interval: Duration,
    pub subscribe_timeout: Duration,
    pub register_timeout: Duration,
    pub command_timeout: Duration,
    pub publish_timeout: Duration,
    /// Requested keepalive period; zero disables pings.
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    pub ping_threshold: u32,
    /// Upper bound of a single readiness wait.
    pub run_timeout: Duration,
    pub max_frame_size: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            identifier: None,
            server_protocol: "tcp".to_string(),
            server_address: "127.0.0.1".to_string(),
            server_port: 8000,
            connect_timeout: Duration::from_secs(30),
            connect_interval: Duration::ZERO,
            subscribe_timeout: Duration::from_secs(30),
            register_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(30),
            publish_timeout: Duration::from_secs(30),
            ping_interval: Duration::from_secs(180),
            ping_timeout: Duration::from_secs(5),
            ping_threshold: 2,
            run_timeout: Duration::from_secs(1),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Broker answer attached to a resolved command.
#[derive(Debug)]
pub(super) struct Reply {
    pub result: Option<i64>,
    pub payload: Value,
}

/// An mbus client: one connection, driven by [`Client::run`].
pub struct Client {
    pub(super) options: ClientOptions,
    pub(super) handler: Option<Box<dyn ClientHandler>>,
    pub(super) state: ClientState,
    /// Whether the application wants to be connected; cleared by `disconnect`.
    pub(super) wanted: bool,
    pub(super) poll: Poll,
    pub(super) events: Events,
    pub(super) waker: Arc<Waker>,
    pub(super) wakeup_tx: Sender<WakeupReason>,
    pub(super) wakeup_rx: Receiver<WakeupReason>,
    pub(super) break_requested: bool,
    pub(super) connection: Option<Connection>,
    /// A bounded read left bytes on the socket.
    pub(super) read_backlog: bool,
    pub(super) decoder: FrameDecoder,
    pub(super) outbound: BytesMut,
    pub(super) queue: RequestQueue,
    pub(super) subscriptions: SubscriptionRegistry,
    pub(super) keepalive: Keepalive,
    pub(super) identifier: Option<String>,
    pub(super) compression: Option<String>,
    /// Start of the most recent connect attempt.
    pub(super) last_attempt: Option<Instant>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state)
            .field("identifier", &self.identifier)
            .field("staged", &self.queue.staged_len())
            .field("pending", &self.queue.pending_len())
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

impl Client {
    pub fn new<H>(options: ClientOptions, handler: H) -> Result<Self, ClientError>
    where
        H: ClientHandler + 'static,
    {
        if options.server_protocol != "tcp" {
            return Err(ClientError::InvalidProtocol(options.server_protocol));
        }
        if options.server_address.is_empty() {
            return Err(ClientError::InvalidOptions("server address is empty"));
        }
        if options.server_port == 0 {
            return Err(ClientError::InvalidOptions("server port is zero"));
        }
        if options.max_frame_size == 0 {
            return Err(ClientError::InvalidOptions("max frame size is zero"));
        }

        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);
        let (wakeup_tx, wakeup_rx) = mpsc::channel();
        let decoder = FrameDecoder::new(options.max_frame_size);

        Ok(Self {
            options,
            handler: Some(Box::new(handler)),
            state: ClientState::Disconnected,
            wanted: false,
            poll,
            events: Events::with_capacity(EVENT_CAPACITY),
            waker,
            wakeup_tx,
            wakeup_rx,
            break_requested: false,
            connection: None,
            read_backlog: false,
            decoder,
            outbound: BytesMut::new(),
            queue: RequestQueue::new(),
            subscriptions: SubscriptionRegistry::new(),
            keepalive: Keepalive::new(),
            identifier: None,
            compression: None,
            last_attempt: None,
        })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Identifier assigned by the broker, only while connected.
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    /// Compression negotiated during the handshake.
    pub fn compression(&self) -> Option<&str> {
        self.compression.as_deref()
    }

    /// `true` while requests are outstanding or bytes are buffered.
    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty() || !self.decoder.is_empty() || !self.outbound.is_empty()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Remote control usable from other threads.
    pub fn handle(&self) -> ClientHandle {
        ClientHandle::new(Arc::clone(&self.waker), self.wakeup_tx.clone())
    }

    /// Requests a connection. The attempt starts on the next `run`.
    pub fn connect(&mut self) -> Result<(), ClientError> {
        self.wanted = true;
        if self.state == ClientState::Disconnected {
            info!("connecting to {}:{}", self.options.server_address, self.options.server_port);
            self.state = ClientState::Connecting;
            self.last_attempt = None;
        }
        Ok(())
    }

    /// Requests a disconnect. Outstanding work is canceled on the next `run`.
    /// Does nothing when already disconnected.
    pub fn disconnect(&mut self) -> Result<(), ClientError> {
        self.wanted = false;
        if matches!(self.state, ClientState::Connecting | ClientState::Connected) {
            info!("disconnecting");
            self.state = ClientState::Disconnecting;
        }
        Ok(())
    }

    /// Interrupts `run_forever` after the current iteration.
    pub fn break_run(&mut self) {
        self.break_requested = true;
    }

    pub fn publish(
        &mut self,
        event: &str,
        payload: Value,
        qos: QoS,
        destination: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<(), ClientError> {
        self.require(ClientState::Connected)?;
        if event.is_empty() {
            return Err(ClientError::InvalidArgument("event is empty"));
        }
        let destination = destination.unwrap_or(EVENT_DESTINATION_SUBSCRIBERS);
        let timeout = or_default(timeout, self.options.publish_timeout);
        match qos {
            QoS::AtMostOnce => self.submit(
                MessageType::Event,
                destination,
                event,
                payload,
                timeout,
                Completion::Publish,
            ),
            QoS::AtLeastOnce => {
                let message = Message {
                    source: self.identifier.clone().unwrap_or_default(),
                    destination: destination.to_string(),
                    identifier: event.to_string(),
                    payload: payload.clone(),
                };
                let wrapped = json!({
                    "destination": destination,
                    "identifier": event,
                    "payload": payload,
                });
                self.submit(
                    MessageType::Command,
                    SERVER_IDENTIFIER,
                    SERVER_COMMAND_EVENT,
                    wrapped,
                    timeout,
                    Completion::PublishAck { message },
                )
            }
        }
    }

    /// Subscribes to `event` from `source` (any source when `None`).
    ///
    /// Matching events go to `callback`, or to
    /// [`ClientHandler::on_message`] when none is given.
    pub fn subscribe(
        &mut self,
        event: &str,
        source: Option<&str>,
        callback: Option<EventCallback>,
        timeout: Option<Duration>,
    ) -> Result<(), ClientError> {
        self.require(ClientState::Connected)?;
        if event.is_empty() {
            return Err(ClientError::InvalidArgument("event is empty"));
        }
        let source = source.unwrap_or(EVENT_SOURCE_ALL);
        if self.subscriptions.contains(source, event)
            || self.queue.has_subscribe_in_flight(source, event)
        {
            return Err(ClientError::AlreadySubscribed {
                source_id: source.to_string(),
                event: event.to_string(),
            });
        }
        let timeout = or_default(timeout, self.options.subscribe_timeout);
        self.submit(
            MessageType::Command,
            SERVER_IDENTIFIER,
            SERVER_COMMAND_SUBSCRIBE,
            json!({ "source": source, "event": event }),
            timeout,
            Completion::Subscribe {
                source: source.to_string(),
                event: event.to_string(),
                callback,
            },
        )
    }

    pub fn unsubscribe(
        &mut self,
        event: &str,
        source: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<(), ClientError> {
        self.require(ClientState::Connected)?;
        if event.is_empty() {
            return Err(ClientError::InvalidArgument("event is empty"));
        }
        let source = source.unwrap_or(EVENT_SOURCE_ALL);
        if !self.subscriptions.contains(source, event) {
            return Err(ClientError::NotSubscribed {
                source_id: source.to_string(),
                event: event.to_string(),
            });
        }
        let timeout = or_default(timeout, self.options.subscribe_timeout);
        self.submit(
            MessageType::Command,
            SERVER_IDENTIFIER,
            SERVER_COMMAND_UNSUBSCRIBE,
            json!({ "source": source, "event": event }),
            timeout,
            Completion::Unsubscribe {
                source: source.to_string(),
                event: event.to_string(),
            },
        )
    }

    /// Sends `command` to `destination`; `callback` runs once with the reply,
    /// a timeout or a cancellation.
    pub fn command(
        &mut self,
        destination: &str,
        command: &str,
        payload: Value,
        callback: Option<CommandCallback>,
        timeout: Option<Duration>,
    ) -> Result<(), ClientError> {
        self.require(ClientState::Connected)?;
        if destination.is_empty() {
            return Err(ClientError::InvalidArgument("destination is empty"));
        }
        if command.is_empty() {
            return Err(ClientError::InvalidArgument("command is empty"));
        }
        if is_builtin_command(command) {
            return Err(ClientError::InvalidArgument("command name is reserved"));
        }
        let timeout = or_default(timeout, self.options.command_timeout);
        self.submit(
            MessageType::Command,
            destination,
            command,
            payload,
            timeout,
            Completion::Command(callback),
        )
    }

    /// Command registration is not offered by this client.
    pub fn register(&mut self, _command: &str) -> Result<(), ClientError> {
        Err(ClientError::Unsupported("command registration"))
    }

    /// Command registration is not offered by this client.
    pub fn unregister(&mut self, _command: &str) -> Result<(), ClientError> {
        Err(ClientError::Unsupported("command registration"))
    }

    fn require(&self, state: ClientState) -> Result<(), ClientError> {
        if self.state == state {
            return Ok(());
        }
        match state {
            ClientState::Connecting => Err(ClientError::NotConnecting(self.state)),
            _ => Err(ClientError::NotConnected(self.state)),
        }
    }

    /// Allocates a sequence number and stages a request.
    fn submit(
        &mut self,
        kind: MessageType,
        destination: &str,
        identifier: &str,
        payload: Value,
        timeout: Duration,
        completion: Completion,
    ) -> Result<(), ClientError> {
        if identifier == SERVER_COMMAND_CREATE {
            self.require(ClientState::Connecting)?;
        } else {
            self.require(ClientState::Connected)?;
        }
        let sequence = self.queue.allocate_sequence()?;
        debug!("staged {identifier} -> {destination}, sequence: {sequence}");
        self.queue.stage(Request::new(
            kind,
            destination,
            identifier,
            sequence,
            payload,
            timeout,
            completion,
        ));
        Ok(())
    }

    /// Queues the `create` command once the socket is connected.
    pub(super) fn issue_handshake(&mut self) -> Result<(), ClientError> {
        let mut payload = json!({ "compressions": [COMPRESSION_NONE] });
        if let Some(identifier) = &self.options.identifier {
            payload["identifier"] = json!(identifier);
        }
        if !self.options.ping_interval.is_zero() {
            payload["ping"] = json!({
                "interval": self.options.ping_interval.as_millis() as u64,
                "timeout": self.options.ping_timeout.as_millis() as u64,
                "threshold": self.options.ping_threshold,
            });
        }
        let timeout = self.options.connect_timeout;
        self.submit(
            MessageType::Command,
            SERVER_IDENTIFIER,
            SERVER_COMMAND_CREATE,
            payload,
            timeout,
            Completion::Handshake,
        )
    }

    pub(super) fn send_ping(&mut self) {
        debug!("sending ping");
        let timeout = self.options.ping_timeout;
        if let Err(err) = self.submit(
            MessageType::Event,
            SERVER_IDENTIFIER,
            SERVER_EVENT_PING,
            Value::Null,
            timeout,
            Completion::Ping,
        ) {
            warn!("can not queue ping: {err}");
        }
    }

    /// Resolves a request that left the queues.
    pub(super) fn complete(&mut self, request: Request, status: CommandStatus, reply: Option<Reply>) {
        debug!(
            "resolved {} sequence: {}, status: {status}",
            request.identifier, request.sequence
        );
        let result = reply.as_ref().and_then(|r| r.result);
        let acked = status.is_success() && result == Some(0);
        match request.completion {
            Completion::Handshake => match status {
                CommandStatus::Success => self.finish_handshake(reply),
                CommandStatus::Timeout => self.connect_failed(ConnectStatus::Timeout),
                CommandStatus::InternalError => self.connect_failed(ConnectStatus::ServerError),
                CommandStatus::Canceled => self.notify_connect(ConnectStatus::Canceled),
            },
            Completion::Ping => {}
            Completion::Publish => {
                let message = Message {
                    source: self.identifier.clone().unwrap_or_default(),
                    destination: request.destination,
                    identifier: request.identifier,
                    payload: request.payload,
                };
                self.notify_publish(&message, status.into());
            }
            Completion::PublishAck { message } => {
                let status = match status {
                    CommandStatus::Success if !acked => PublishStatus::InternalError,
                    other => other.into(),
                };
                self.notify_publish(&message, status);
            }
            Completion::Subscribe {
                source,
                event,
                callback,
            } => {
                let status = match status {
                    CommandStatus::Success if acked => {
                        self.subscriptions
                            .insert(Subscription::new(&source, &event, callback));
                        SubscribeStatus::Success
                    }
                    CommandStatus::Success => SubscribeStatus::InternalError,
                    other => other.into(),
                };
                self.with_handler(|handler, client| {
                    handler.on_subscribe(client, &source, &event, status)
                });
            }
            Completion::Unsubscribe { source, event } => {
                let status = match status {
                    CommandStatus::Success if acked => {
                        self.subscriptions.remove(&source, &event);
                        UnsubscribeStatus::Success
                    }
                    CommandStatus::Success => UnsubscribeStatus::InternalError,
                    other => other.into(),
                };
                self.with_handler(|handler, client| {
                    handler.on_unsubscribe(client, &source, &event, status)
                });
            }
            Completion::Command(callback) => {
                let Some(callback) = callback else {
                    return;
                };
                let (result, response) = match reply {
                    Some(reply) => (reply.result, Some(reply.payload)),
                    None => (None, None),
                };
                let command_reply = CommandReply {
                    destination: request.destination,
                    command: request.identifier,
                    request: request.payload,
                    result,
                    response,
                };
                callback(self, &command_reply, status);
            }
        }
    }

    fn finish_handshake(&mut self, reply: Option<Reply>) {
        let status = match reply {
            Some(reply) => self.accept_handshake(reply),
            None => ConnectStatus::ServerError,
        };
        if status.is_success() {
            info!(
                "connected as {}",
                self.identifier.as_deref().unwrap_or_default()
            );
            self.state = ClientState::Connected;
            self.notify_connect(ConnectStatus::Success);
        } else {
            self.connect_failed(status);
        }
    }

    /// Validates the `create` reply and stores the negotiated parameters.
    fn accept_handshake(&mut self, reply: Reply) -> ConnectStatus {
        if reply.result != Some(0) {
            warn!("handshake rejected, result: {:?}", reply.result);
            return ConnectStatus::ServerError;
        }
        let Some(payload) = reply.payload.as_object() else {
            warn!("handshake reply has no payload");
            return ConnectStatus::ServerError;
        };
        let identifier = match payload.get("identifier").and_then(Value::as_str) {
            Some(identifier) if !identifier.is_empty() => identifier.to_string(),
            _ => return ConnectStatus::InvalidIdentifier,
        };
        let compression = payload
            .get("compression")
            .and_then(Value::as_str)
            .unwrap_or(COMPRESSION_NONE);
        if compression != COMPRESSION_NONE {
            warn!("server selected unsupported compression: {compression}");
            return ConnectStatus::InvalidProtocol;
        }
        let ping = payload.get("ping").and_then(Value::as_object).map(|ping| {
            let millis = |key: &str| ping.get(key).and_then(Value::as_u64).unwrap_or(0);
            PingParams {
                interval: Duration::from_millis(millis("interval")),
                timeout: Duration::from_millis(millis("timeout")),
                threshold: ping
                    .get("threshold")
                    .and_then(Value::as_u64)
                    .map_or(0, |t| u32::try_from(t).unwrap_or(u32::MAX)),
            }
        });

        self.identifier = Some(identifier);
        self.compression = Some(compression.to_string());
        match ping {
            Some(params) => {
                debug!("keepalive: {params:?}");
                self.keepalive.start(params, clock::now());
            }
            None => self.keepalive.stop(),
        }
        ConnectStatus::Success
    }

    /// Starts a non-blocking connect to the configured server.
    pub(super) fn start_connect(&mut self, now: Instant) {
        self.last_attempt = Some(now);
        self.decoder.clear();
        self.outbound.clear();

        let opened = socket::resolve(&self.options.server_address, self.options.server_port)
            .map_err(|err| {
                warn!("can not resolve {}: {err}", self.options.server_address);
                ConnectStatus::ServerUnavailable
            })
            .and_then(|addr| {
                debug!("opening connection to {addr}");
                Connection::open(addr).map_err(|err| connect_status(&err))
            });
        match opened {
            Ok(connection) => self.connection = Some(connection),
            Err(status) => self.connect_failed(status),
        }
    }

    /// Tears down a failed connect attempt; retries later when the failure
    /// is recoverable and a reconnect interval is set.
    pub(super) fn connect_failed(&mut self, status: ConnectStatus) {
        warn!("connect failed: {status}");
        self.teardown(false);
        let retry =
            self.wanted && status.is_recoverable() && !self.options.connect_interval.is_zero();
        self.settle(retry);
        self.notify_connect(status);
    }

    /// Unplanned loss of the connection.
    pub(super) fn connection_lost(&mut self, status: DisconnectStatus) {
        match self.state {
            ClientState::Connecting => {
                let status = match status {
                    DisconnectStatus::ConnectionClosed => ConnectStatus::ServerUnavailable,
                    DisconnectStatus::PingTimeout | DisconnectStatus::Timeout => {
                        ConnectStatus::Timeout
                    }
                    DisconnectStatus::Canceled => ConnectStatus::Canceled,
                    _ => ConnectStatus::InternalError,
                };
                self.connect_failed(status);
            }
            ClientState::Connected => {
                warn!("connection lost: {status}");
                self.teardown(false);
                let retry = self.wanted && !self.options.connect_interval.is_zero();
                self.settle(retry);
                self.notify_disconnect(status);
            }
            // a requested disconnect is already underway
            ClientState::Disconnecting | ClientState::Disconnected => {}
        }
    }

    /// Completes a requested disconnect.
    pub(super) fn finish_disconnect(&mut self) {
        self.teardown(true);
        let reconnect = self.wanted;
        self.settle(reconnect);
        info!("disconnected");
        self.notify_disconnect(DisconnectStatus::Success);
    }

    fn settle(&mut self, reconnect: bool) {
        if reconnect {
            self.state = ClientState::Connecting;
        } else {
            self.state = ClientState::Disconnected;
            self.wanted = false;
        }
    }

    /// Closes the socket, cancels every outstanding request and
    /// subscription, and forgets the negotiated session.
    ///
    /// An in-flight handshake is resolved with `ConnectStatus::Canceled` only
    /// when `report_handshake` is set; a failing connect reports its own
    /// status instead.
    pub(super) fn teardown(&mut self, report_handshake: bool) {
        // rejects new submissions from the cancellation callbacks below
        self.state = ClientState::Disconnecting;
        if let Some(mut connection) = self.connection.take() {
            connection.deregister(self.poll.registry());
            connection.shutdown();
        }
        self.read_backlog = false;
        self.decoder.clear();
        self.outbound.clear();
        self.keepalive.stop();
        self.identifier = None;
        self.compression = None;

        for request in self.queue.reset() {
            if !report_handshake && matches!(request.completion, Completion::Handshake) {
                continue;
            }
            self.complete(request, CommandStatus::Canceled, None);
        }
        for subscription in self.subscriptions.drain() {
            self.with_handler(|handler, client| {
                handler.on_unsubscribe(
                    client,
                    &subscription.source,
                    &subscription.event,
                    UnsubscribeStatus::Canceled,
                )
            });
        }
    }

    /// Runs `f` with the handler lent out, so it can call back into the client.
    pub(super) fn with_handler<F>(&mut self, f: F)
    where
        F: FnOnce(&mut dyn ClientHandler, &mut Client),
    {
        if let Some(mut handler) = self.handler.take() {
            f(handler.as_mut(), self);
            self.handler = Some(handler);
        }
    }

    fn notify_connect(&mut self, status: ConnectStatus) {
        self.with_handler(|handler, client| handler.on_connect(client, status));
    }

    fn notify_disconnect(&mut self, status: DisconnectStatus) {
        self.with_handler(|handler, client| handler.on_disconnect(client, status));
    }

    fn notify_publish(&mut self, message: &Message, status: PublishStatus) {
        self.with_handler(|handler, client| handler.on_publish(client, message, status));
    }
}

fn or_default(timeout: Option<Duration>, default: Duration) -> Duration {
    match timeout {
        Some(timeout) if !timeout.is_zero() => timeout,
        _ => default,
    }
}

/// Maps a socket error seen while connecting to a connect status.
pub(super) fn connect_status(err: &io::Error) -> ConnectStatus {
    match err.kind() {
        ErrorKind::ConnectionRefused => ConnectStatus::ConnectionRefused,
        ErrorKind::HostUnreachable
        | ErrorKind::NetworkUnreachable
        | ErrorKind::AddrNotAvailable
        | ErrorKind::NotFound => ConnectStatus::ServerUnavailable,
        ErrorKind::TimedOut => ConnectStatus::Timeout,
        _ => ConnectStatus::InternalError,
    }
}
