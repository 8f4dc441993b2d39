//! CLI for mbus
//!
//! Subcommands:
//! - `publish`: publish one event and exit
//! - `subscribe`: subscribe to one event and print what arrives
//! - `command`: call a command and print the reply
//! - `listen`: print every event the broker delivers

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{error, info};

use mbus_client::client::{
    Client, ClientHandler, CommandReply, CommandStatus, ConnectStatus, DisconnectStatus, Message,
    PublishStatus, QoS, SubscribeStatus,
};
use mbus_client::config::load_config;
use mbus_client::transport::names::EVENT_IDENTIFIER_ALL;
use mbus_client::utils::logging;

#[derive(Parser)]
#[command(name = "mbus", about = "mbus command line client")]
struct Cli {
    /// Broker address (overrides configuration)
    #[arg(long)]
    address: Option<String>,
    /// Broker port (overrides configuration)
    #[arg(long)]
    port: Option<u16>,
    /// Requested client identifier
    #[arg(long)]
    identifier: Option<String>,
    /// Log level: error, warn, info, debug or trace
    #[arg(long)]
    log_level: Option<String>,
    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Clone)]
enum Action {
    /// Publish one event
    Publish {
        #[arg(long)]
        event: String,
        /// JSON payload
        #[arg(long)]
        payload: Option<String>,
        #[arg(long)]
        destination: Option<String>,
        /// 0 = at most once, 1 = at least once
        #[arg(long, default_value_t = 0)]
        qos: u8,
    },
    /// Subscribe to an event and print every match
    Subscribe {
        #[arg(long)]
        event: String,
        #[arg(long)]
        source: Option<String>,
    },
    /// Call a command and print the reply
    Command {
        #[arg(long)]
        destination: String,
        #[arg(long)]
        command: String,
        /// JSON payload
        #[arg(long)]
        payload: Option<String>,
    },
    /// Print every event from every source
    Listen,
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init(cli.log_level.as_deref().unwrap_or(&settings.logging.level));

    let mut options = settings.client_options();
    if let Some(address) = cli.address {
        options.server_address = address;
    }
    if let Some(port) = cli.port {
        options.server_port = port;
    }
    if cli.identifier.is_some() {
        options.identifier = cli.identifier;
    }

    match run(options, cli.action) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("mbus failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Runs the client until the action is done; `Ok(false)` when it failed.
fn run(
    options: mbus_client::client::ClientOptions,
    action: Action,
) -> Result<bool, Box<dyn std::error::Error>> {
    let payload = match &action {
        Action::Publish { payload, .. } | Action::Command { payload, .. } => parse_payload(payload)?,
        _ => Value::Null,
    };
    if let Action::Publish { qos, .. } = &action {
        QoS::try_from(*qos).map_err(|q| format!("invalid qos: {q}"))?;
    }

    let failed = Arc::new(AtomicBool::new(false));
    let tool = Tool {
        action,
        payload,
        failed: Arc::clone(&failed),
    };
    let mut client = Client::new(options, tool)?;
    client.connect()?;
    client.run_forever()?;
    Ok(!failed.load(Ordering::SeqCst))
}

fn parse_payload(payload: &Option<String>) -> Result<Value, serde_json::Error> {
    match payload {
        Some(text) => serde_json::from_str(text),
        None => Ok(Value::Null),
    }
}

/// Handler that performs one action once connected.
struct Tool {
    action: Action,
    payload: Value,
    failed: Arc<AtomicBool>,
}

impl Tool {
    fn fail(&self, client: &mut Client, reason: &str) {
        error!("{reason}");
        self.failed.store(true, Ordering::SeqCst);
        let _ = client.disconnect();
    }

    fn start(&mut self, client: &mut Client) -> Result<(), mbus_client::utils::error::ClientError> {
        let payload = std::mem::take(&mut self.payload);
        match &self.action {
            Action::Publish {
                event,
                destination,
                qos,
                ..
            } => {
                let qos = QoS::try_from(*qos).unwrap_or_default();
                client.publish(event, payload, qos, destination.as_deref(), None)
            }
            Action::Subscribe { event, source } => {
                client.subscribe(event, source.as_deref(), None, None)
            }
            Action::Command {
                destination,
                command,
                ..
            } => {
                let failed = Arc::clone(&self.failed);
                client.command(
                    destination,
                    command,
                    payload,
                    Some(Box::new(
                        move |client: &mut Client, reply: &CommandReply, status: CommandStatus| {
                            match (&reply.response, status) {
                                (Some(response), CommandStatus::Success) => {
                                    println!("result: {:?}, response: {}", reply.result, response);
                                }
                                _ => {
                                    println!("command {}: {}", reply.command, status);
                                    failed.store(true, Ordering::SeqCst);
                                }
                            }
                            let _ = client.disconnect();
                        },
                    )),
                    None,
                )
            }
            Action::Listen => client.subscribe(EVENT_IDENTIFIER_ALL, None, None, None),
        }
    }
}

impl ClientHandler for Tool {
    fn on_connect(&mut self, client: &mut Client, status: ConnectStatus) {
        if !status.is_success() {
            self.fail(client, &format!("connect failed: {status}"));
            return;
        }
        info!("connected as {}", client.identifier().unwrap_or_default());
        if let Err(e) = self.start(client) {
            self.fail(client, &format!("request rejected: {e}"));
        }
    }

    fn on_disconnect(&mut self, _client: &mut Client, status: DisconnectStatus) {
        info!("disconnected: {status}");
    }

    fn on_message(&mut self, _client: &mut Client, message: &Message) {
        println!(
            "{} -> {}: {}",
            message.source, message.identifier, message.payload
        );
    }

    fn on_publish(&mut self, client: &mut Client, message: &Message, status: PublishStatus) {
        println!("publish {}: {}", message.identifier, status);
        if status.is_success() {
            let _ = client.disconnect();
        } else {
            self.fail(client, "publish failed");
        }
    }

    fn on_subscribe(&mut self, client: &mut Client, source: &str, event: &str, status: SubscribeStatus) {
        println!("subscribe {source}/{event}: {status}");
        if !status.is_success() {
            self.fail(client, "subscribe failed");
        }
    }
}
