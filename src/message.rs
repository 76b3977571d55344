//! Server → client message definitions
//!
//! The wire protocol is plain text, one message per line. Every reply the
//! relay can produce is a variant of `ServerMessage`; its `Display` impl is
//! the exact text written to the socket (the line terminator is added by the
//! framing codec).

use std::fmt;

use crate::error::ProtocolError;

/// Placeholder listed when nobody is registered
pub const NOBODY: &str = "Nobody";

/// Which command a usage hint refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    /// `/register <name>`
    Register,
    /// `/send <user> <message>`
    Send,
}

/// Server → Client message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Username registered
    Registered { name: String },
    /// Username already held by someone else
    NameTaken,
    /// This connection already has a username
    AlreadyRegistered { name: String },
    /// Usage hint for a malformed command
    Usage(Usage),
    /// Snapshot of registered usernames
    UserList { names: Vec<String> },
    /// Directed send was handed to the destination's queue
    Dispatching { to: String },
    /// Directed message from another user
    Direct { from: String, body: String },
    /// Destination username is not registered
    NotConnected { name: String },
    /// Directed send attempted before registering
    RegistrationRequired,
    /// Delivery acknowledgment from a recipient
    Delivered { by: String },
    /// Legacy public chat line, relayed verbatim
    Broadcast { text: String },
    /// Incoming line exceeded the maximum length
    LineTooLong,
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Registered { name } => write!(f, "[SERVER] Registered as {name}"),
            ServerMessage::NameTaken => f.write_str("[SERVER] Error: name already exists"),
            ServerMessage::AlreadyRegistered { name } => {
                write!(f, "[SERVER] Error: already registered as {name}")
            }
            ServerMessage::Usage(Usage::Register) => {
                f.write_str("[SERVER] Usage: /register <name>")
            }
            ServerMessage::Usage(Usage::Send) => {
                f.write_str("[SERVER] Usage: /send <user> <message>")
            }
            ServerMessage::UserList { names } => {
                if names.is_empty() {
                    write!(f, "[SERVER] Connected users: {NOBODY}")
                } else {
                    write!(f, "[SERVER] Connected users: {}", names.join(", "))
                }
            }
            ServerMessage::Dispatching { to } => write!(f, "[INFO] Sending to {to}..."),
            ServerMessage::Direct { from, body } => write!(f, "[{from}]: {body}"),
            ServerMessage::NotConnected { name } => {
                write!(f, "[SERVER] Error: {name} is not connected")
            }
            ServerMessage::RegistrationRequired => {
                f.write_str("[SERVER] Error: must register first")
            }
            ServerMessage::Delivered { by } => {
                write!(f, "[SYSTEM] {by} received your message")
            }
            ServerMessage::Broadcast { text } => f.write_str(text),
            ServerMessage::LineTooLong => f.write_str("[SERVER] Error: line too long"),
        }
    }
}

/// Convert ProtocolError to ServerMessage for client notification
impl From<ProtocolError> for ServerMessage {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::NameTaken(_) => ServerMessage::NameTaken,
            ProtocolError::AlreadyRegistered(name) => ServerMessage::AlreadyRegistered { name },
            ProtocolError::RegistrationRequired => ServerMessage::RegistrationRequired,
            ProtocolError::NotConnected(name) => ServerMessage::NotConnected { name },
            ProtocolError::LineTooLong => ServerMessage::LineTooLong,
        }
    }
}
