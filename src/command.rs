//! Command parser
//!
//! Classifies one received line into a typed `Command`. Keywords are
//! matched against the first whitespace-delimited token, so `/registerme`
//! is ordinary chat rather than a registration.

use crate::message::Usage;

/// Claim a username
pub const REGISTER: &str = "/register";
/// Enumerate registered users
pub const LIST: &str = "/list";
/// Directed message
pub const SEND: &str = "/send";
/// Internal delivery acknowledgment marker
pub const ACK: &str = "__ACK__";

/// A parsed client line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/register <name>`
    Register(String),
    /// `/list`
    List,
    /// `/send <destination> <body...>`
    Send { destination: String, body: String },
    /// `__ACK__ <original sender>`
    Ack(String),
    /// `/register` or `/send` with the wrong number of arguments
    Malformed(Usage),
    /// `__ACK__` without exactly one name; dropped without a reply
    MalformedAck,
    /// Anything else; relayed to every other connection
    Unrecognized(String),
}

impl Command {
    /// Parse one line (without its terminator) into a command
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let keyword = trimmed.split_whitespace().next().unwrap_or_default();

        match keyword {
            REGISTER => {
                let mut parts = trimmed.split_whitespace().skip(1);
                match (parts.next(), parts.next()) {
                    (Some(name), None) => Command::Register(name.to_string()),
                    _ => Command::Malformed(Usage::Register),
                }
            }
            LIST if trimmed == LIST => Command::List,
            SEND => {
                // keyword, destination, and the rest of the line as the body
                let rest = trimmed[SEND.len()..].trim_start();
                match rest.split_once(char::is_whitespace) {
                    Some((destination, body)) => Command::Send {
                        destination: destination.to_string(),
                        body: body.trim_start().to_string(),
                    },
                    None => Command::Malformed(Usage::Send),
                }
            }
            ACK => {
                let mut parts = trimmed.split_whitespace().skip(1);
                match (parts.next(), parts.next()) {
                    (Some(name), None) => Command::Ack(name.to_string()),
                    _ => Command::MalformedAck,
                }
            }
            _ => Command::Unrecognized(line.to_string()),
        }
    }
}
