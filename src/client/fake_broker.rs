//! Scripted in-process mbus broker for the engine tests.
//!
//! Runs a current-thread tokio runtime on its own thread and serves one
//! client connection at a time. Every inbound frame is recorded; replies
//! follow the [`BrokerScript`]. Tests can also push frames, raw bytes or a
//! close towards the connected client.

use std::net::TcpListener as StdTcpListener;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::BytesMut;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use super::ClientOptions;
use crate::transport::codec::encode_frame;
use crate::transport::message::{Envelope, MessageType};
use crate::transport::names::{
    SERVER_COMMAND_CREATE, SERVER_COMMAND_EVENT, SERVER_COMMAND_SUBSCRIBE,
    SERVER_COMMAND_UNSUBSCRIBE, SERVER_EVENT_PING, SERVER_EVENT_PONG, SERVER_IDENTIFIER,
};

#[derive(Debug, Clone)]
pub struct BrokerScript {
    pub identifier: String,
    pub compression: String,
    pub handshake_result: i64,
    /// `(interval_ms, timeout_ms, threshold)` sent in the create reply.
    pub ping: Option<(u64, u64, u32)>,
    pub answer_pings: bool,
    pub answer_subscribes: bool,
    pub answer_commands: bool,
    pub close_after_handshake: bool,
}

impl Default for BrokerScript {
    fn default() -> Self {
        Self {
            identifier: "client-1".to_string(),
            compression: "none".to_string(),
            handshake_result: 0,
            ping: None,
            answer_pings: true,
            answer_subscribes: true,
            answer_commands: true,
            close_after_handshake: false,
        }
    }
}

#[derive(Debug)]
pub enum Push {
    Frame(Envelope),
    Raw(Vec<u8>),
    Close,
}

pub struct FakeBroker {
    pub port: u16,
    received: Arc<Mutex<Vec<Envelope>>>,
    pushes: mpsc::UnboundedSender<Push>,
}

impl FakeBroker {
    pub fn start(script: BrokerScript) -> Self {
        let listener = StdTcpListener::bind("127.0.0.1:0").expect("bind fake broker");
        listener
            .set_nonblocking(true)
            .expect("non-blocking listener");
        let port = listener.local_addr().expect("local addr").port();
        let received = Arc::new(Mutex::new(Vec::new()));
        let (pushes, push_rx) = mpsc::unbounded_channel();

        let recorded = Arc::clone(&received);
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("broker runtime");
            runtime.block_on(accept_loop(listener, script, recorded, push_rx));
        });

        Self {
            port,
            received,
            pushes,
        }
    }

    /// Client options pointing at this broker, with keepalive off and short
    /// timeouts.
    pub fn options(&self) -> ClientOptions {
        ClientOptions {
            server_port: self.port,
            connect_timeout: Duration::from_secs(2),
            ping_interval: Duration::ZERO,
            run_timeout: Duration::from_millis(50),
            ..ClientOptions::default()
        }
    }

    pub fn push(&self, push: Push) {
        self.pushes.send(push).expect("broker thread alive");
    }

    pub fn received(&self) -> Vec<Envelope> {
        self.received.lock().unwrap().clone()
    }

    /// Recorded frames carrying `identifier`.
    pub fn received_named(&self, identifier: &str) -> Vec<Envelope> {
        self.received()
            .into_iter()
            .filter(|e| e.identifier.as_deref() == Some(identifier))
            .collect()
    }
}

async fn accept_loop(
    listener: StdTcpListener,
    script: BrokerScript,
    received: Arc<Mutex<Vec<Envelope>>>,
    mut pushes: mpsc::UnboundedReceiver<Push>,
) {
    let listener = TcpListener::from_std(listener).expect("tokio listener");
    while let Ok((stream, _)) = listener.accept().await {
        serve(stream, &script, &received, &mut pushes).await;
    }
}

async fn serve(
    stream: TcpStream,
    script: &BrokerScript,
    received: &Mutex<Vec<Envelope>>,
    pushes: &mut mpsc::UnboundedReceiver<Push>,
) {
    let (reader, mut writer) = stream.into_split();
    let (frames_tx, mut frames) = mpsc::unbounded_channel();
    let reader_task = tokio::spawn(read_frames(reader, frames_tx));

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(envelope) = frame else { break };
                received.lock().unwrap().push(envelope.clone());
                let mut ok = true;
                for reply in respond(script, &envelope) {
                    ok &= write_envelope(&mut writer, &reply).await;
                }
                let created = envelope.identifier.as_deref() == Some(SERVER_COMMAND_CREATE);
                if !ok || (created && script.close_after_handshake) {
                    break;
                }
            }
            push = pushes.recv() => {
                let ok = match push {
                    Some(Push::Frame(envelope)) => write_envelope(&mut writer, &envelope).await,
                    Some(Push::Raw(bytes)) => writer.write_all(&bytes).await.is_ok(),
                    Some(Push::Close) | None => false,
                };
                if !ok {
                    break;
                }
            }
        }
    }
    reader_task.abort();
}

async fn read_frames(mut reader: OwnedReadHalf, frames: mpsc::UnboundedSender<Envelope>) {
    loop {
        let Ok(len) = reader.read_u32().await else {
            return;
        };
        let mut body = vec![0u8; len as usize];
        if reader.read_exact(&mut body).await.is_err() {
            return;
        }
        let Ok(envelope) = serde_json::from_slice::<Envelope>(&body) else {
            continue;
        };
        if frames.send(envelope).is_err() {
            return;
        }
    }
}

async fn write_envelope(writer: &mut OwnedWriteHalf, envelope: &Envelope) -> bool {
    let mut frame = BytesMut::new();
    encode_frame(envelope, &mut frame).expect("encode broker frame");
    writer.write_all(&frame).await.is_ok()
}

fn respond(script: &BrokerScript, envelope: &Envelope) -> Vec<Envelope> {
    let identifier = envelope.identifier.as_deref().unwrap_or_default();
    match envelope.kind {
        MessageType::Command => {
            let Some(sequence) = envelope.sequence else {
                return Vec::new();
            };
            match identifier {
                SERVER_COMMAND_CREATE => {
                    let mut payload = json!({
                        "identifier": script.identifier,
                        "compression": script.compression,
                    });
                    if let Some((interval, timeout, threshold)) = script.ping {
                        payload["ping"] = json!({
                            "interval": interval,
                            "timeout": timeout,
                            "threshold": threshold,
                        });
                    }
                    vec![Envelope::result(sequence, script.handshake_result, payload)]
                }
                SERVER_COMMAND_SUBSCRIBE | SERVER_COMMAND_UNSUBSCRIBE if script.answer_subscribes => {
                    vec![Envelope::result(sequence, 0, Value::Null)]
                }
                SERVER_COMMAND_SUBSCRIBE | SERVER_COMMAND_UNSUBSCRIBE => Vec::new(),
                SERVER_COMMAND_EVENT if script.answer_commands => {
                    vec![Envelope::result(sequence, 0, Value::Null)]
                }
                _ if script.answer_commands => vec![Envelope::result(
                    sequence,
                    0,
                    json!({ "echo": envelope.payload }),
                )],
                _ => Vec::new(),
            }
        }
        MessageType::Event if identifier == SERVER_EVENT_PING && script.answer_pings => {
            vec![Envelope::event(
                SERVER_IDENTIFIER,
                &script.identifier,
                SERVER_EVENT_PONG,
                Value::Null,
            )]
        }
        _ => Vec::new(),
    }
}
