//! Error types for the relay
//!
//! Defines application-level errors and message delivery errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Application-level errors
///
/// Every variant is fatal to the connection it occurs on.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing error (fatal unless it is an over-long line)
    #[error("Framing error: {0}")]
    Lines(#[from] LinesCodecError),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,
}

/// Protocol errors
///
/// Reported back to the offending client as a text reply; the connection
/// stays open.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Username is already held by another connection
    #[error("Name already exists: {0}")]
    NameTaken(String),

    /// This connection already registered a username
    #[error("Already registered as {0}")]
    AlreadyRegistered(String),

    /// Directed send attempted before registering
    #[error("Registration required")]
    RegistrationRequired,

    /// Destination username is not registered
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// Received line exceeded the configured maximum length
    #[error("Line too long")]
    LineTooLong,
}

/// Message delivery errors
///
/// Occurs when a connection's outbound queue cannot take another message.
/// Either variant means the connection must be torn down.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The connection's writer has gone away
    #[error("Channel closed")]
    ChannelClosed,

    /// The connection is not draining its outbound queue
    #[error("Channel full")]
    ChannelFull,
}
