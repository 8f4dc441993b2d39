//! Client state and per-operation outcome types.
//!
//! Every asynchronous operation ends in exactly one status value. All of the
//! status enums share `Success`, `InternalError`, `Timeout` and `Canceled`;
//! connect and disconnect carry a few extra reasons.

use std::fmt;

/// Lifecycle of the single connection owned by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl ClientState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientState::Disconnected => "disconnected",
            ClientState::Connecting => "connecting",
            ClientState::Connected => "connected",
            ClientState::Disconnecting => "disconnecting",
        }
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery guarantee of a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QoS {
    /// Queued locally and reported as sent once framed; no broker round trip.
    #[default]
    AtMostOnce,
    /// Routed through a broker command and reported on its result.
    AtLeastOnce,
}

impl TryFrom<u8> for QoS {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            other => Err(other),
        }
    }
}

macro_rules! status_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $text:literal),* $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            Success,
            InternalError,
            Timeout,
            Canceled,
            $($variant,)*
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $name::Success => "success",
                    $name::InternalError => "internal error",
                    $name::Timeout => "timeout",
                    $name::Canceled => "canceled",
                    $($name::$variant => $text,)*
                }
            }

            pub fn is_success(&self) -> bool {
                matches!(self, $name::Success)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

status_enum!(
    /// Outcome of a connect attempt, including the handshake.
    ConnectStatus {
        InvalidProtocol => "invalid protocol",
        ConnectionRefused => "connection refused",
        ServerUnavailable => "server unavailable",
        InvalidProtocolVersion => "invalid protocol version",
        InvalidIdentifier => "invalid client identifier",
        ServerError => "server error",
    }
);

status_enum!(
    /// Reason a live connection ended.
    DisconnectStatus {
        ConnectionClosed => "connection closed",
        PingTimeout => "ping timeout",
    }
);

status_enum!(PublishStatus {});
status_enum!(SubscribeStatus {});
status_enum!(UnsubscribeStatus {});
status_enum!(RegisterStatus {});
status_enum!(UnregisterStatus {});
status_enum!(CommandStatus {});

impl ConnectStatus {
    /// Failures worth retrying when a reconnect interval is configured.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ConnectStatus::ConnectionRefused
                | ConnectStatus::ServerUnavailable
                | ConnectStatus::Timeout
        )
    }
}

impl From<CommandStatus> for PublishStatus {
    fn from(status: CommandStatus) -> Self {
        match status {
            CommandStatus::Success => PublishStatus::Success,
            CommandStatus::InternalError => PublishStatus::InternalError,
            CommandStatus::Timeout => PublishStatus::Timeout,
            CommandStatus::Canceled => PublishStatus::Canceled,
        }
    }
}

impl From<CommandStatus> for SubscribeStatus {
    fn from(status: CommandStatus) -> Self {
        match status {
            CommandStatus::Success => SubscribeStatus::Success,
            CommandStatus::InternalError => SubscribeStatus::InternalError,
            CommandStatus::Timeout => SubscribeStatus::Timeout,
            CommandStatus::Canceled => SubscribeStatus::Canceled,
        }
    }
}

impl From<CommandStatus> for UnsubscribeStatus {
    fn from(status: CommandStatus) -> Self {
        match status {
            CommandStatus::Success => UnsubscribeStatus::Success,
            CommandStatus::InternalError => UnsubscribeStatus::InternalError,
            CommandStatus::Timeout => UnsubscribeStatus::Timeout,
            CommandStatus::Canceled => UnsubscribeStatus::Canceled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings() {
        assert_eq!(ConnectStatus::ServerUnavailable.to_string(), "server unavailable");
        assert_eq!(ConnectStatus::InvalidIdentifier.as_str(), "invalid client identifier");
        assert_eq!(DisconnectStatus::PingTimeout.to_string(), "ping timeout");
        assert_eq!(CommandStatus::Canceled.to_string(), "canceled");
        assert_eq!(ClientState::Disconnecting.to_string(), "disconnecting");
    }

    #[test]
    fn test_recoverable_connect_failures() {
        assert!(ConnectStatus::ConnectionRefused.is_recoverable());
        assert!(ConnectStatus::ServerUnavailable.is_recoverable());
        assert!(ConnectStatus::Timeout.is_recoverable());
        assert!(!ConnectStatus::InvalidProtocol.is_recoverable());
        assert!(!ConnectStatus::ServerError.is_recoverable());
    }

    #[test]
    fn test_command_status_translates() {
        assert_eq!(
            SubscribeStatus::from(CommandStatus::Timeout),
            SubscribeStatus::Timeout
        );
        assert_eq!(
            PublishStatus::from(CommandStatus::Canceled),
            PublishStatus::Canceled
        );
    }

    #[test]
    fn test_qos_from_number() {
        assert_eq!(QoS::try_from(0u8), Ok(QoS::AtMostOnce));
        assert_eq!(QoS::try_from(1u8), Ok(QoS::AtLeastOnce));
        assert_eq!(QoS::try_from(2u8), Err(2));
    }
}
