//! Line Relay Server Library
//!
//! A newline-framed TCP chat relay. Clients claim usernames, list who is
//! connected, send directed messages to one another and acknowledge
//! delivery; any other line is relayed to every other connection.
//!
//! # Protocol
//! - `/register <name>` claims a username (once per connection)
//! - `/list` lists registered usernames
//! - `/send <name> <text>` sends a directed message
//! - `__ACK__ <name>` tells `<name>` their message arrived
//! - anything else is broadcast verbatim to all other connections
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor owning the registry and all handles
//! - Each connection has a `handler` task talking to the actor
//! - `Supervisor` owns the accept loop and tracks handler tasks
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use line_relay::{Config, Supervisor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), line_relay::AppError> {
//!     let supervisor = Supervisor::bind(&Config::default()).await?;
//!     supervisor.run_until_ctrl_c().await
//! }
//! ```

pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod server;
pub mod supervisor;
pub mod types;

// Re-export main types for convenience
pub use client::Client;
pub use command::Command;
pub use config::{Config, ConnectionLimits};
pub use error::{AppError, ProtocolError, SendError};
pub use handler::handle_connection;
pub use message::{ServerMessage, Usage};
pub use registry::Registry;
pub use server::{ChatServer, ServerCommand};
pub use supervisor::Supervisor;
pub use types::ClientId;
