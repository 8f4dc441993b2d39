use std::time::Duration;

use serde::Deserialize;

use crate::client::ClientOptions;

/// Top-level configuration settings for the application.
///
/// Includes the client connection settings and the logging level.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub client: ClientSettings,
    pub logging: LoggingSettings,
}

/// Connection settings of the mbus client. Durations are in milliseconds.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ClientSettings {
    pub identifier: Option<String>,
    pub server_protocol: String,
    pub server_address: String,
    pub server_port: u16,
    pub connect_timeout_ms: u64,
    pub connect_interval_ms: u64,
    pub subscribe_timeout_ms: u64,
    pub register_timeout_ms: u64,
    pub command_timeout_ms: u64,
    pub publish_timeout_ms: u64,
    pub ping_interval_ms: u64,
    pub ping_timeout_ms: u64,
    pub ping_threshold: u32,
    pub run_timeout_ms: u64,
    pub max_frame_size: usize,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values are filled from
/// `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub client: Option<PartialClientSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialClientSettings {
    pub identifier: Option<String>,
    pub server_protocol: Option<String>,
    pub server_address: Option<String>,
    pub server_port: Option<u16>,
    pub connect_timeout_ms: Option<u64>,
    pub connect_interval_ms: Option<u64>,
    pub subscribe_timeout_ms: Option<u64>,
    pub register_timeout_ms: Option<u64>,
    pub command_timeout_ms: Option<u64>,
    pub publish_timeout_ms: Option<u64>,
    pub ping_interval_ms: Option<u64>,
    pub ping_timeout_ms: Option<u64>,
    pub ping_threshold: Option<u32>,
    pub run_timeout_ms: Option<u64>,
    pub max_frame_size: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

/// Provides default values for `Settings`, mirroring `ClientOptions::default()`.
impl Default for Settings {
    fn default() -> Self {
        let options = ClientOptions::default();
        let millis = |d: Duration| d.as_millis() as u64;
        Self {
            client: ClientSettings {
                identifier: options.identifier,
                server_protocol: options.server_protocol,
                server_address: options.server_address,
                server_port: options.server_port,
                connect_timeout_ms: millis(options.connect_timeout),
                connect_interval_ms: millis(options.connect_interval),
                subscribe_timeout_ms: millis(options.subscribe_timeout),
                register_timeout_ms: millis(options.register_timeout),
                command_timeout_ms: millis(options.command_timeout),
                publish_timeout_ms: millis(options.publish_timeout),
                ping_interval_ms: millis(options.ping_interval),
                ping_timeout_ms: millis(options.ping_timeout),
                ping_threshold: options.ping_threshold,
                run_timeout_ms: millis(options.run_timeout),
                max_frame_size: options.max_frame_size,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl PartialSettings {
    /// Fills every missing value from `defaults`.
    pub fn merge(self, defaults: Settings) -> Settings {
        let client = self.client.unwrap_or_default();
        let logging = self.logging.unwrap_or_default();
        let d = defaults.client;
        Settings {
            client: ClientSettings {
                identifier: client.identifier.or(d.identifier),
                server_protocol: client.server_protocol.unwrap_or(d.server_protocol),
                server_address: client.server_address.unwrap_or(d.server_address),
                server_port: client.server_port.unwrap_or(d.server_port),
                connect_timeout_ms: client.connect_timeout_ms.unwrap_or(d.connect_timeout_ms),
                connect_interval_ms: client.connect_interval_ms.unwrap_or(d.connect_interval_ms),
                subscribe_timeout_ms: client
                    .subscribe_timeout_ms
                    .unwrap_or(d.subscribe_timeout_ms),
                register_timeout_ms: client.register_timeout_ms.unwrap_or(d.register_timeout_ms),
                command_timeout_ms: client.command_timeout_ms.unwrap_or(d.command_timeout_ms),
                publish_timeout_ms: client.publish_timeout_ms.unwrap_or(d.publish_timeout_ms),
                ping_interval_ms: client.ping_interval_ms.unwrap_or(d.ping_interval_ms),
                ping_timeout_ms: client.ping_timeout_ms.unwrap_or(d.ping_timeout_ms),
                ping_threshold: client.ping_threshold.unwrap_or(d.ping_threshold),
                run_timeout_ms: client.run_timeout_ms.unwrap_or(d.run_timeout_ms),
                max_frame_size: client.max_frame_size.unwrap_or(d.max_frame_size),
            },
            logging: LoggingSettings {
                level: logging.level.unwrap_or(defaults.logging.level),
            },
        }
    }
}

impl Settings {
    /// Builds the options a [`Client`](crate::client::Client) is created with.
    pub fn client_options(&self) -> ClientOptions {
        let c = &self.client;
        ClientOptions {
            identifier: c.identifier.clone(),
            server_protocol: c.server_protocol.clone(),
            server_address: c.server_address.clone(),
            server_port: c.server_port,
            connect_timeout: Duration::from_millis(c.connect_timeout_ms),
            connect_interval: Duration::from_millis(c.connect_interval_ms),
            subscribe_timeout: Duration::from_millis(c.subscribe_timeout_ms),
            register_timeout: Duration::from_millis(c.register_timeout_ms),
            command_timeout: Duration::from_millis(c.command_timeout_ms),
            publish_timeout: Duration::from_millis(c.publish_timeout_ms),
            ping_interval: Duration::from_millis(c.ping_interval_ms),
            ping_timeout: Duration::from_millis(c.ping_timeout_ms),
            ping_threshold: c.ping_threshold,
            run_timeout: Duration::from_millis(c.run_timeout_ms),
            max_frame_size: c.max_frame_size,
        }
    }
}
