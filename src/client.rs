//! Client struct definition
//!
//! Represents a connected client (a connection handle) with its state and
//! outbound message channel.

use std::net::SocketAddr;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::ClientId;

/// Connected client information
///
/// The `sender` feeds the connection's single writer, which is the only
/// code that touches the socket's write half. Messages queued here are
/// therefore written one whole line at a time, in queue order.
///
/// `closer` is shared with the connection's handler; cancelling it makes
/// the handler drop the socket even if its writer is stuck on a stalled peer.
#[derive(Debug)]
pub struct Client {
    /// Unique identifier for this client
    pub id: ClientId,
    /// Remote address, for logging
    pub peer: Option<SocketAddr>,
    /// Registered username (None until `/register` succeeds)
    pub username: Option<String>,
    /// Server → Client message channel
    pub sender: mpsc::Sender<ServerMessage>,
    /// Close signal watched by the connection's handler
    pub closer: CancellationToken,
}

impl Client {
    /// Create a new client with the given ID and sender channel
    pub fn new(
        id: ClientId,
        peer: Option<SocketAddr>,
        sender: mpsc::Sender<ServerMessage>,
        closer: CancellationToken,
    ) -> Self {
        Self {
            id,
            peer,
            username: None,
            sender,
            closer,
        }
    }

    /// Tell the connection's handler to close the socket now
    pub fn close(&self) {
        self.closer.cancel();
    }

    /// Queue a message for this client without waiting
    ///
    /// Never blocks the caller. A closed channel means the writer is gone;
    /// a full one means the peer stopped reading. Both are delivery failures.
    pub fn deliver(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender.try_send(msg).map_err(|e| match e {
            TrySendError::Closed(_) => SendError::ChannelClosed,
            TrySendError::Full(_) => SendError::ChannelFull,
        })
    }

    /// Get the display name for this client
    ///
    /// Returns the username if set, otherwise the client ID.
    pub fn display_name(&self) -> String {
        match &self.username {
            Some(name) => name.clone(),
            None => self.id.to_string(),
        }
    }

    /// Check if this client has registered a username
    pub fn has_username(&self) -> bool {
        self.username.is_some()
    }

    /// Set the client's username
    pub fn set_username(&mut self, username: String) {
        debug_assert!(self.username.is_none(), "username is set once per connection");
        self.username = Some(username);
    }
}
