//! Connection supervisor
//!
//! Owns the TCP listener, the ChatServer actor task and every connection
//! handler task. Handlers live in a `JoinSet`, so the supervisor can reap
//! them as they finish and abort the rest on shutdown.

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::{Config, ConnectionLimits};
use crate::error::AppError;
use crate::handler::handle_connection;
use crate::server::{ChatServer, ServerCommand};

/// Accept loop plus the tasks it spawned
pub struct Supervisor {
    listener: TcpListener,
    cmd_tx: mpsc::Sender<ServerCommand>,
    server: tokio::task::JoinHandle<()>,
    connections: JoinSet<()>,
    limits: ConnectionLimits,
}

impl Supervisor {
    /// Bind the configured address and start the ChatServer actor
    pub async fn bind(config: &Config) -> Result<Self, AppError> {
        let listener = TcpListener::bind(config.listen).await?;
        Ok(Self::new(listener, config))
    }

    /// Wrap an already-bound listener and start the ChatServer actor
    pub fn new(listener: TcpListener, config: &Config) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer);
        let server = tokio::spawn(ChatServer::new(cmd_rx).run());

        Self {
            listener,
            cmd_tx,
            server,
            connections: JoinSet::new(),
            limits: config.limits(),
        }
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` resolves
    ///
    /// On shutdown, stops accepting, aborts every connection handler, then
    /// waits for the ChatServer actor to drain and exit.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), AppError>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                accepted = self.listener.accept() => {
                    self.handle_accept_result(accepted);
                }
                Some(joined) = self.connections.join_next(), if !self.connections.is_empty() => {
                    log_finished(joined);
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Accept connections until Ctrl-C
    pub async fn run_until_ctrl_c(self) -> Result<(), AppError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to install Ctrl-C handler: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Spawn a handler for a new connection, or log the accept failure
    fn handle_accept_result(&mut self, result: std::io::Result<(TcpStream, SocketAddr)>) {
        match result {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let cmd_tx = self.cmd_tx.clone();
                let limits = self.limits;

                self.connections.spawn(async move {
                    if let Err(e) = handle_connection(stream, cmd_tx, limits).await {
                        warn!("Connection {} ended with error: {}", addr, e);
                    }
                });
                debug!("Active connections: {}", self.connections.len());
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }

    /// Abort every handler, then let the actor run out of senders
    async fn shutdown(self) {
        let Supervisor {
            listener,
            cmd_tx,
            server,
            mut connections,
            ..
        } = self;

        drop(listener);
        info!("Closing {} connections", connections.len());
        connections.shutdown().await;

        // Handlers are gone; this was the last sender
        drop(cmd_tx);
        if let Err(e) = server.await {
            error!("ChatServer task failed: {}", e);
        }
        info!("Supervisor stopped");
    }
}

/// Log how a connection handler task finished
fn log_finished(joined: Result<(), JoinError>) {
    match joined {
        Ok(()) => debug!("Connection task finished"),
        Err(e) if e.is_panic() => error!("Connection task panicked: {}", e),
        Err(e) => debug!("Connection task cancelled: {}", e),
    }
}
