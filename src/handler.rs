//! Connection handler
//!
//! Handles one client connection: line framing, parsing each received line
//! into a `Command`, and writing queued `ServerMessage`s back to the socket.
//!
//! Framing is newline-delimited (`LinesCodec`). Partial lines are buffered
//! until their terminator arrives, so one TCP read never has to equal one
//! command. The read side and the write side run as two futures raced in one
//! task against the handle's close signal; whichever ends first ends the
//! connection and drops the socket.

use futures_util::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::config::ConnectionLimits;
use crate::error::AppError;
use crate::message::ServerMessage;
use crate::server::ServerCommand;
use crate::types::ClientId;

/// Sends `Disconnect` to the actor when the handler exits
///
/// Runs on every exit path: normal close, I/O error, panic, or the task
/// being aborted by the supervisor.
struct DisconnectGuard {
    client_id: ClientId,
    cmd_tx: mpsc::Sender<ServerCommand>,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let cmd = ServerCommand::Disconnect {
            client_id: self.client_id,
        };
        match self.cmd_tx.try_send(cmd) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(cmd)) => {
                // Actor is busy; finish the handoff on the runtime
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    let cmd_tx = self.cmd_tx.clone();
                    handle.spawn(async move {
                        let _ = cmd_tx.send(cmd).await;
                    });
                }
            }
        }
    }
}

/// Handle a new TCP connection
///
/// Registers a connection handle with the ChatServer, then pumps lines in
/// both directions until the peer closes, an I/O error occurs, or the actor
/// tears the handle down.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<ServerCommand>,
    limits: ConnectionLimits,
) -> Result<(), AppError> {
    let peer = stream.peer_addr().ok();
    let client_id = ClientId::new();
    debug!("Client {} accepted from {:?}", client_id, peer);

    let (read_half, write_half) = stream.into_split();
    let lines_in = FramedRead::new(
        read_half,
        LinesCodec::new_with_max_length(limits.max_line_length),
    );
    let lines_out = FramedWrite::new(write_half, LinesCodec::new());

    // Channel for server -> client messages
    let (msg_tx, msg_rx) = mpsc::channel::<ServerMessage>(limits.client_buffer);
    let closer = CancellationToken::new();

    cmd_tx
        .send(ServerCommand::Connect {
            client_id,
            peer,
            sender: msg_tx,
            closer: closer.clone(),
        })
        .await
        .map_err(|_| AppError::ChannelSend)?;

    let _guard = DisconnectGuard {
        client_id,
        cmd_tx: cmd_tx.clone(),
    };

    let result = tokio::select! {
        result = read_loop(client_id, lines_in, &cmd_tx) => {
            debug!("Read side ended for {}", client_id);
            result
        }
        result = write_loop(client_id, lines_out, msg_rx) => {
            debug!("Write side ended for {}", client_id);
            result
        }
        _ = closer.cancelled() => {
            // Torn down by the server; unsent output is discarded
            debug!("Server closed handle for {}", client_id);
            Ok(())
        }
    };

    info!("Client {} connection closed", client_id);
    result
}

/// Read lines from the socket and forward them to the actor as commands
async fn read_loop(
    client_id: ClientId,
    mut lines: FramedRead<OwnedReadHalf, LinesCodec>,
    cmd_tx: &mpsc::Sender<ServerCommand>,
) -> Result<(), AppError> {
    let mut recovering = false;

    loop {
        let line = match lines.next().await {
            Some(line) => line,
            // FramedRead yields a single None after a decode error, then resumes
            None if recovering => {
                recovering = false;
                continue;
            }
            None => break,
        };

        let cmd = match line {
            Ok(line) => {
                recovering = false;
                debug!("Line from {}: {:?}", client_id, line);
                ServerCommand::Execute {
                    client_id,
                    command: Command::parse(&line),
                }
            }
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                // Codec discards up to the next newline and keeps going
                warn!("Client {} sent an over-long line", client_id);
                recovering = true;
                ServerCommand::LineTooLong { client_id }
            }
            Err(e) => return Err(e.into()),
        };

        if cmd_tx.send(cmd).await.is_err() {
            debug!("Server closed, ending read loop for {}", client_id);
            return Err(AppError::ChannelSend);
        }
    }

    debug!("Client {} closed its side", client_id);
    Ok(())
}

/// Write queued messages to the socket, one line each
///
/// Ends when the actor drops the connection handle (all senders gone) or a
/// write fails.
async fn write_loop(
    client_id: ClientId,
    mut lines: FramedWrite<OwnedWriteHalf, LinesCodec>,
    mut msg_rx: mpsc::Receiver<ServerMessage>,
) -> Result<(), AppError> {
    while let Some(msg) = msg_rx.recv().await {
        if let Err(e) = lines.send(msg.to_string()).await {
            debug!("Write to {} failed: {}", client_id, e);
            return Err(e.into());
        }
    }

    debug!("Handle for {} released by server", client_id);
    if let Err(e) = SinkExt::<String>::close(&mut lines).await {
        debug!("Close for {} failed: {}", client_id, e);
    }
    Ok(())
}
