//! Reserved names of the mbus protocol.

pub const METHOD_TYPE_COMMAND: &str = "org.mbus.method.type.command";
pub const METHOD_TYPE_EVENT: &str = "org.mbus.method.type.event";
pub const METHOD_TYPE_RESULT: &str = "org.mbus.method.type.result";

/// Sequence numbers are drawn from `[SEQUENCE_START, SEQUENCE_END)`.
pub const SEQUENCE_START: u32 = 1;
pub const SEQUENCE_END: u32 = 9999;

pub const EVENT_SOURCE_ALL: &str = "org.mbus.method.event.source.all";
pub const EVENT_DESTINATION_ALL: &str = "org.mbus.method.event.destination.all";
pub const EVENT_DESTINATION_SUBSCRIBERS: &str = "org.mbus.method.event.destination.subscribers";
pub const EVENT_IDENTIFIER_ALL: &str = "org.mbus.method.event.identifier.all";

pub const SERVER_IDENTIFIER: &str = "org.mbus.server";

pub const SERVER_COMMAND_CREATE: &str = "org.mbus.server.command.create";
pub const SERVER_COMMAND_EVENT: &str = "org.mbus.server.command.event";
pub const SERVER_COMMAND_CALL: &str = "org.mbus.server.command.call";
pub const SERVER_COMMAND_RESULT: &str = "org.mbus.server.command.result";
pub const SERVER_COMMAND_STATUS: &str = "org.mbus.server.command.status";
pub const SERVER_COMMAND_CLIENTS: &str = "org.mbus.server.command.clients";
pub const SERVER_COMMAND_SUBSCRIBE: &str = "org.mbus.server.command.subscribe";
pub const SERVER_COMMAND_UNSUBSCRIBE: &str = "org.mbus.server.command.unsubscribe";
pub const SERVER_COMMAND_REGISTER: &str = "org.mbus.server.command.register";
pub const SERVER_COMMAND_UNREGISTER: &str = "org.mbus.server.command.unregister";
pub const SERVER_COMMAND_CLOSE: &str = "org.mbus.server.command.close";

pub const SERVER_EVENT_CONNECTED: &str = "org.mbus.server.event.connected";
pub const SERVER_EVENT_DISCONNECTED: &str = "org.mbus.server.event.disconnected";
pub const SERVER_EVENT_SUBSCRIBED: &str = "org.mbus.server.event.subscribed";
pub const SERVER_EVENT_UNSUBSCRIBED: &str = "org.mbus.server.event.unsubscribed";
pub const SERVER_EVENT_PING: &str = "org.mbus.server.event.ping";
pub const SERVER_EVENT_PONG: &str = "org.mbus.server.event.pong";

/// The only compression this client offers during the handshake.
pub const COMPRESSION_NONE: &str = "none";

/// Commands that the engine issues on the caller's behalf and translates
/// into dedicated status notifications.
pub fn is_builtin_command(command: &str) -> bool {
    matches!(
        command,
        SERVER_COMMAND_CREATE
            | SERVER_COMMAND_EVENT
            | SERVER_COMMAND_SUBSCRIBE
            | SERVER_COMMAND_UNSUBSCRIBE
            | SERVER_COMMAND_REGISTER
            | SERVER_COMMAND_UNREGISTER
    )
}
