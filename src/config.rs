//! Configuration for the relay server
//!
//! All settings come from the command line; every flag has a default so the
//! server starts with no arguments at all.

use std::net::SocketAddr;

use clap::Parser;

/// Default bind address
pub const DEFAULT_LISTEN: &str = "127.0.0.1:5000";

/// Default maximum length of one received line, in bytes
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4096;

/// Default channel buffer size for server commands
pub const DEFAULT_COMMAND_BUFFER: usize = 256;

/// Default per-connection outbound queue size
pub const DEFAULT_CLIENT_BUFFER: usize = 64;

/// Command-line arguments for the relay server
#[derive(Parser, Debug, Clone)]
#[command(name = "line_relay")]
#[command(version)]
#[command(about = "A line-based chat relay with usernames and directed messages", long_about = None)]
pub struct Config {
    /// Address to bind to (e.g., 127.0.0.1:5000; port 0 picks a free port)
    #[arg(short = 'l', long, default_value = DEFAULT_LISTEN)]
    pub listen: SocketAddr,

    /// Longest accepted line in bytes; longer lines are rejected with an error reply
    #[arg(long, default_value_t = DEFAULT_MAX_LINE_LENGTH)]
    pub max_line_length: usize,

    /// Capacity of the channel from connections to the server actor
    #[arg(long, default_value_t = DEFAULT_COMMAND_BUFFER)]
    pub command_buffer: usize,

    /// Outbound messages queued per connection before it is dropped as stalled
    #[arg(long, default_value_t = DEFAULT_CLIENT_BUFFER)]
    pub client_buffer: usize,

    /// Default tracing filter; RUST_LOG takes precedence when set
    #[arg(long, default_value = "line_relay=info")]
    pub log_filter: String,
}

impl Config {
    /// Per-connection settings handed to each handler
    pub fn limits(&self) -> ConnectionLimits {
        ConnectionLimits {
            max_line_length: self.max_line_length,
            client_buffer: self.client_buffer,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 5000))),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            command_buffer: DEFAULT_COMMAND_BUFFER,
            client_buffer: DEFAULT_CLIENT_BUFFER,
            log_filter: "line_relay=info".to_string(),
        }
    }
}

/// Settings each connection handler needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLimits {
    /// Longest accepted line in bytes
    pub max_line_length: usize,
    /// Outbound queue capacity
    pub client_buffer: usize,
}
