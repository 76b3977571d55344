//! ChatServer actor implementation
//!
//! The central actor that owns all shared state: the live connection table
//! and the username registry. Connection handlers talk to it over an mpsc
//! channel, so every registry read and write is serialized through
//! `handle_command` and no lock is needed.
//!
//! The actor never waits on a peer. Outbound messages go through
//! `Client::deliver`, which fails instead of blocking; a failed delivery tears
//! the destination down exactly as a disconnect would.

use std::collections::HashMap;
use std::net::SocketAddr;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::command::Command;
use crate::error::ProtocolError;
use crate::message::{ServerMessage, Usage};
use crate::registry::Registry;
use crate::types::ClientId;

/// Commands sent from handlers to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// New client connected
    Connect {
        client_id: ClientId,
        peer: Option<SocketAddr>,
        sender: mpsc::Sender<ServerMessage>,
        closer: CancellationToken,
    },
    /// Client disconnected (read or write side ended)
    Disconnect { client_id: ClientId },
    /// A parsed line from the client
    Execute {
        client_id: ClientId,
        command: Command,
    },
    /// The client sent a line longer than the configured limit
    LineTooLong { client_id: ClientId },
}

/// The main ChatServer actor
pub struct ChatServer {
    /// All connected clients: ClientId -> Client
    clients: HashMap<ClientId, Client>,
    /// Registered usernames: name -> ClientId
    registry: Registry,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>) -> Self {
        Self {
            clients: HashMap::new(),
            registry: Registry::new(),
            receiver,
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!("ChatServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(
            clients = self.clients.len(),
            registered = self.registry.len(),
            "ChatServer shutting down"
        );
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Connect {
                client_id,
                peer,
                sender,
                closer,
            } => self.handle_connect(client_id, peer, sender, closer),
            ServerCommand::Disconnect { client_id } => {
                debug!("Client {} requested teardown", client_id);
                self.teardown(client_id);
            }
            ServerCommand::Execute { client_id, command } => {
                if !self.clients.contains_key(&client_id) {
                    // Already torn down after a failed delivery
                    debug!("Dropping command from departed client {}", client_id);
                    return;
                }
                self.execute(client_id, command);
            }
            ServerCommand::LineTooLong { client_id } => {
                self.reply(client_id, ProtocolError::LineTooLong.into());
            }
        }
    }

    /// Route one parsed command on behalf of `client_id`
    fn execute(&mut self, client_id: ClientId, command: Command) {
        match command {
            Command::Register(name) => self.handle_register(client_id, name),
            Command::List => self.handle_list(client_id),
            Command::Send { destination, body } => {
                self.handle_send(client_id, destination, body)
            }
            Command::Ack(original_sender) => self.handle_ack(client_id, original_sender),
            Command::Malformed(usage) => self.handle_malformed(client_id, usage),
            Command::MalformedAck => {
                debug!("Dropping malformed ack from {}", client_id);
            }
            Command::Unrecognized(raw) => self.handle_broadcast(client_id, raw),
        }
    }

    /// Handle new client connection
    fn handle_connect(
        &mut self,
        client_id: ClientId,
        peer: Option<SocketAddr>,
        sender: mpsc::Sender<ServerMessage>,
        closer: CancellationToken,
    ) {
        info!("Client {} connected from {:?}", client_id, peer);
        self.clients
            .insert(client_id, Client::new(client_id, peer, sender, closer));
        debug!(
            "Total clients: {}, Registered users: {}",
            self.clients.len(),
            self.registry.len()
        );
    }

    /// Handle `/register <name>`
    fn handle_register(&mut self, client_id: ClientId, name: String) {
        let Some(client) = self.clients.get_mut(&client_id) else {
            return;
        };

        if let Some(current) = &client.username {
            let err = ProtocolError::AlreadyRegistered(current.clone());
            self.reply(client_id, err.into());
            return;
        }

        if !self.registry.register(&name, client_id) {
            info!("Client {} tried taken name '{}'", client_id, name);
            self.reply(client_id, ProtocolError::NameTaken(name).into());
            return;
        }

        client.set_username(name.clone());
        info!("Client {} registered as '{}'", client_id, name);
        self.reply(client_id, ServerMessage::Registered { name });
    }

    /// Handle `/list`
    fn handle_list(&mut self, client_id: ClientId) {
        let names = self.registry.list_names();
        self.reply(client_id, ServerMessage::UserList { names });
    }

    /// Handle `/send <destination> <body>`
    fn handle_send(&mut self, client_id: ClientId, destination: String, body: String) {
        let Some(from) = self.username_of(client_id) else {
            self.reply(client_id, ProtocolError::RegistrationRequired.into());
            return;
        };

        let Some(target) = self.registry.lookup(&destination) else {
            self.reply(client_id, ProtocolError::NotConnected(destination).into());
            return;
        };

        debug!("Routing message from '{}' to '{}'", from, destination);
        if !self.deliver(target, ServerMessage::Direct { from, body }) {
            self.reply(client_id, ProtocolError::NotConnected(destination).into());
            return;
        }

        self.reply(client_id, ServerMessage::Dispatching { to: destination });
    }

    /// Handle `__ACK__ <original sender>`
    ///
    /// Fire-and-forget: nothing is reported back to the acknowledging client.
    fn handle_ack(&mut self, client_id: ClientId, original_sender: String) {
        let Some(by) = self.username_of(client_id) else {
            debug!("Dropping ack from unregistered client {}", client_id);
            return;
        };

        match self.registry.lookup(&original_sender) {
            Some(target) => {
                debug!("Ack from '{}' to '{}'", by, original_sender);
                self.deliver(target, ServerMessage::Delivered { by });
            }
            None => debug!("Dropping ack for absent user '{}'", original_sender),
        }
    }

    /// Handle a known keyword with the wrong arguments
    fn handle_malformed(&mut self, client_id: ClientId, usage: Usage) {
        match usage {
            Usage::Send if self.username_of(client_id).is_none() => {
                self.reply(client_id, ProtocolError::RegistrationRequired.into());
            }
            usage => self.reply(client_id, ServerMessage::Usage(usage)),
        }
    }

    /// Relay a raw line to every other connected client
    fn handle_broadcast(&mut self, client_id: ClientId, raw: String) {
        if raw.trim().is_empty() {
            return;
        }

        let failed: Vec<ClientId> = self
            .clients
            .values()
            .filter(|client| client.id != client_id)
            .filter_map(|client| {
                client
                    .deliver(ServerMessage::Broadcast { text: raw.clone() })
                    .err()
                    .map(|e| {
                        warn!("Broadcast to {} failed: {}", client.id, e);
                        client.id
                    })
            })
            .collect();

        debug!(
            "Broadcast from {} reached {} clients",
            client_id,
            self.clients.len().saturating_sub(1 + failed.len())
        );

        for id in failed {
            self.teardown(id);
        }
    }

    /// Send a reply to `client_id`, tearing it down if it cannot take it
    fn reply(&mut self, client_id: ClientId, msg: ServerMessage) {
        self.deliver(client_id, msg);
    }

    /// Queue `msg` for `client_id`
    ///
    /// Returns false (after tearing the client down) if delivery failed.
    fn deliver(&mut self, client_id: ClientId, msg: ServerMessage) -> bool {
        let Some(client) = self.clients.get(&client_id) else {
            return false;
        };

        match client.deliver(msg) {
            Ok(()) => true,
            Err(e) => {
                warn!("Delivery to {} failed: {}", client_id, e);
                self.teardown(client_id);
                false
            }
        }
    }

    /// Remove a client, release its username and close its socket
    ///
    /// Idempotent: a second call for the same client is a no-op.
    fn teardown(&mut self, client_id: ClientId) {
        let Some(client) = self.clients.remove(&client_id) else {
            return;
        };
        client.close();

        if let Some(name) = &client.username {
            if self.registry.lookup(name) == Some(client_id) {
                self.registry.unregister(name);
            }
        }

        info!(
            "Client {} ({}) from {:?} disconnected",
            client_id,
            client.display_name(),
            client.peer
        );
        debug!(
            "Total clients: {}, Registered users: {}",
            self.clients.len(),
            self.registry.len()
        );
    }

    /// Helper: registered username of a client, if any
    fn username_of(&self, client_id: ClientId) -> Option<String> {
        self.clients
            .get(&client_id)
            .and_then(|client| client.username.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Actor under test plus the command sender keeping it alive
    fn new_server() -> (ChatServer, mpsc::Sender<ServerCommand>) {
        let (tx, rx) = mpsc::channel(16);
        (ChatServer::new(rx), tx)
    }

    /// Connect a client directly to the actor and return its inbox
    fn connect(server: &mut ChatServer) -> (ClientId, mpsc::Receiver<ServerMessage>) {
        connect_with_capacity(server, 32)
    }

    fn connect_with_capacity(
        server: &mut ChatServer,
        capacity: usize,
    ) -> (ClientId, mpsc::Receiver<ServerMessage>) {
        let (client_id, rx, _closer) = connect_with_closer(server, capacity);
        (client_id, rx)
    }

    /// Connect a client and keep the handler's side of its close signal
    fn connect_with_closer(
        server: &mut ChatServer,
        capacity: usize,
    ) -> (ClientId, mpsc::Receiver<ServerMessage>, CancellationToken) {
        let client_id = ClientId::new();
        let (tx, rx) = mpsc::channel(capacity);
        let closer = CancellationToken::new();
        server.handle_command(ServerCommand::Connect {
            client_id,
            peer: None,
            sender: tx,
            closer: closer.clone(),
        });
        (client_id, rx, closer)
    }

    fn run_line(server: &mut ChatServer, client_id: ClientId, line: &str) {
        server.handle_command(ServerCommand::Execute {
            client_id,
            command: Command::parse(line),
        });
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg.to_string());
        }
        out
    }

    #[tokio::test]
    async fn test_register_success() {
        let (mut server, _tx) = new_server();
        let (alice, mut alice_rx) = connect(&mut server);

        run_line(&mut server, alice, "/register alice");

        assert_eq!(drain(&mut alice_rx), vec!["[SERVER] Registered as alice"]);
        assert_eq!(server.registry.lookup("alice"), Some(alice));
    }

    #[tokio::test]
    async fn test_register_taken_name_keeps_original() {
        let (mut server, _tx) = new_server();
        let (alice, mut alice_rx) = connect(&mut server);
        let (other, mut other_rx) = connect(&mut server);

        run_line(&mut server, alice, "/register alice");
        run_line(&mut server, other, "/register alice");

        assert_eq!(drain(&mut alice_rx), vec!["[SERVER] Registered as alice"]);
        assert_eq!(
            drain(&mut other_rx),
            vec!["[SERVER] Error: name already exists"]
        );
        assert_eq!(server.registry.lookup("alice"), Some(alice));
        assert!(server.username_of(other).is_none());
    }

    #[tokio::test]
    async fn test_reregistration_rejected() {
        let (mut server, _tx) = new_server();
        let (alice, mut alice_rx) = connect(&mut server);

        run_line(&mut server, alice, "/register alice");
        run_line(&mut server, alice, "/register alicia");

        assert_eq!(
            drain(&mut alice_rx),
            vec![
                "[SERVER] Registered as alice",
                "[SERVER] Error: already registered as alice",
            ]
        );
        assert_eq!(server.registry.list_names(), vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn test_register_usage_hint() {
        let (mut server, _tx) = new_server();
        let (client, mut rx) = connect(&mut server);

        run_line(&mut server, client, "/register");

        assert_eq!(drain(&mut rx), vec!["[SERVER] Usage: /register <name>"]);
        assert!(server.registry.is_empty());
    }

    #[tokio::test]
    async fn test_list_empty_and_populated() {
        let (mut server, _tx) = new_server();
        let (alice, mut alice_rx) = connect(&mut server);

        run_line(&mut server, alice, "/list");
        run_line(&mut server, alice, "/register alice");
        run_line(&mut server, alice, "/list");

        assert_eq!(
            drain(&mut alice_rx),
            vec![
                "[SERVER] Connected users: Nobody",
                "[SERVER] Registered as alice",
                "[SERVER] Connected users: alice",
            ]
        );
    }

    #[tokio::test]
    async fn test_send_delivers_and_acknowledges_dispatch() {
        let (mut server, _tx) = new_server();
        let (alice, mut alice_rx) = connect(&mut server);
        let (bob, mut bob_rx) = connect(&mut server);

        run_line(&mut server, alice, "/register alice");
        run_line(&mut server, bob, "/register bob");
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        run_line(&mut server, bob, "/send alice hello");

        assert_eq!(drain(&mut alice_rx), vec!["[bob]: hello"]);
        assert_eq!(drain(&mut bob_rx), vec!["[INFO] Sending to alice..."]);
    }

    #[tokio::test]
    async fn test_send_requires_registration() {
        let (mut server, _tx) = new_server();
        let (alice, mut alice_rx) = connect(&mut server);
        let (anon, mut anon_rx) = connect(&mut server);

        run_line(&mut server, alice, "/register alice");
        drain(&mut alice_rx);

        run_line(&mut server, anon, "/send alice hi");
        run_line(&mut server, anon, "/send alice");

        assert_eq!(
            drain(&mut anon_rx),
            vec![
                "[SERVER] Error: must register first",
                "[SERVER] Error: must register first",
            ]
        );
        assert!(drain(&mut alice_rx).is_empty());
    }

    #[tokio::test]
    async fn test_send_usage_hint_when_registered() {
        let (mut server, _tx) = new_server();
        let (alice, mut alice_rx) = connect(&mut server);

        run_line(&mut server, alice, "/register alice");
        run_line(&mut server, alice, "/send bob");

        assert_eq!(
            drain(&mut alice_rx),
            vec![
                "[SERVER] Registered as alice",
                "[SERVER] Usage: /send <user> <message>",
            ]
        );
    }

    #[tokio::test]
    async fn test_send_to_absent_user() {
        let (mut server, _tx) = new_server();
        let (alice, mut alice_rx) = connect(&mut server);
        let (_other, mut other_rx) = connect(&mut server);

        run_line(&mut server, alice, "/register alice");
        drain(&mut alice_rx);

        run_line(&mut server, alice, "/send carol hi");

        assert_eq!(
            drain(&mut alice_rx),
            vec!["[SERVER] Error: carol is not connected"]
        );
        assert!(drain(&mut other_rx).is_empty());
    }

    #[tokio::test]
    async fn test_ack_notifies_original_sender() {
        let (mut server, _tx) = new_server();
        let (alice, mut alice_rx) = connect(&mut server);
        let (bob, mut bob_rx) = connect(&mut server);

        run_line(&mut server, alice, "/register alice");
        run_line(&mut server, bob, "/register bob");
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        run_line(&mut server, alice, "__ACK__ bob");

        assert_eq!(
            drain(&mut bob_rx),
            vec!["[SYSTEM] alice received your message"]
        );
        assert!(drain(&mut alice_rx).is_empty());
    }

    #[tokio::test]
    async fn test_ack_dropped_silently() {
        let (mut server, _tx) = new_server();
        let (bob, mut bob_rx) = connect(&mut server);
        let (anon, mut anon_rx) = connect(&mut server);

        run_line(&mut server, bob, "/register bob");
        drain(&mut bob_rx);

        // Unregistered acknowledger, absent target, malformed marker
        run_line(&mut server, anon, "__ACK__ bob");
        run_line(&mut server, bob, "__ACK__ carol");
        run_line(&mut server, bob, "__ACK__");

        assert!(drain(&mut bob_rx).is_empty());
        assert!(drain(&mut anon_rx).is_empty());
    }

    #[tokio::test]
    async fn test_unrecognized_broadcasts_to_others() {
        let (mut server, _tx) = new_server();
        let (anon, mut anon_rx) = connect(&mut server);
        let (alice, mut alice_rx) = connect(&mut server);
        let (_other, mut other_rx) = connect(&mut server);

        run_line(&mut server, alice, "/register alice");
        drain(&mut alice_rx);

        run_line(&mut server, anon, "hello everyone");

        assert!(drain(&mut anon_rx).is_empty());
        assert_eq!(drain(&mut alice_rx), vec!["hello everyone"]);
        assert_eq!(drain(&mut other_rx), vec!["hello everyone"]);
    }

    #[tokio::test]
    async fn test_blank_line_not_broadcast() {
        let (mut server, _tx) = new_server();
        let (anon, _anon_rx) = connect(&mut server);
        let (_other, mut other_rx) = connect(&mut server);

        run_line(&mut server, anon, "   ");

        assert!(drain(&mut other_rx).is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_releases_username() {
        let (mut server, _tx) = new_server();
        let (alice, _alice_rx) = connect(&mut server);
        let (bob, mut bob_rx) = connect(&mut server);

        run_line(&mut server, alice, "/register alice");
        run_line(&mut server, bob, "/register bob");
        drain(&mut bob_rx);

        server.handle_command(ServerCommand::Disconnect { client_id: alice });
        // Second teardown is a no-op
        server.handle_command(ServerCommand::Disconnect { client_id: alice });

        run_line(&mut server, bob, "/list");
        run_line(&mut server, bob, "/send alice still there?");

        assert_eq!(
            drain(&mut bob_rx),
            vec![
                "[SERVER] Connected users: bob",
                "[SERVER] Error: alice is not connected",
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_delivery_tears_down_destination() {
        let (mut server, _tx) = new_server();
        let (alice, alice_rx) = connect(&mut server);
        let (bob, mut bob_rx) = connect(&mut server);

        run_line(&mut server, alice, "/register alice");
        run_line(&mut server, bob, "/register bob");
        drain(&mut bob_rx);

        // Alice's writer is gone
        drop(alice_rx);
        run_line(&mut server, bob, "/send alice hello");
        run_line(&mut server, bob, "/list");

        assert_eq!(
            drain(&mut bob_rx),
            vec![
                "[SERVER] Error: alice is not connected",
                "[SERVER] Connected users: bob",
            ]
        );
        assert!(!server.clients.contains_key(&alice));
    }

    #[tokio::test]
    async fn test_full_queue_evicted_on_broadcast() {
        let (mut server, _tx) = new_server();
        let (slow, _slow_rx) = connect_with_capacity(&mut server, 1);
        let (talker, _talker_rx) = connect(&mut server);

        run_line(&mut server, slow, "/register slow");
        // Queue now holds the registration reply; the next message overflows
        run_line(&mut server, talker, "anyone there?");

        assert!(!server.clients.contains_key(&slow));
        assert_eq!(server.registry.lookup("slow"), None);
    }

    #[tokio::test]
    async fn test_eviction_signals_handler_to_close() {
        let (mut server, _tx) = new_server();
        let (slow, _slow_rx, slow_closer) = connect_with_closer(&mut server, 1);
        let (talker, _talker_rx, talker_closer) = connect_with_closer(&mut server, 32);

        run_line(&mut server, slow, "/register slow");
        assert!(!slow_closer.is_cancelled());

        run_line(&mut server, talker, "anyone there?");

        assert!(slow_closer.is_cancelled());
        assert!(!talker_closer.is_cancelled());
    }

    #[tokio::test]
    async fn test_disconnect_signals_close() {
        let (mut server, _tx) = new_server();
        let (alice, _alice_rx, closer) = connect_with_closer(&mut server, 32);

        server.handle_command(ServerCommand::Disconnect { client_id: alice });

        assert!(closer.is_cancelled());
    }

    #[tokio::test]
    async fn test_commands_after_teardown_ignored() {
        let (mut server, _tx) = new_server();
        let (alice, _alice_rx) = connect(&mut server);

        server.handle_command(ServerCommand::Disconnect { client_id: alice });
        run_line(&mut server, alice, "/register alice");

        assert!(server.registry.is_empty());
    }

    #[tokio::test]
    async fn test_line_too_long_reply() {
        let (mut server, _tx) = new_server();
        let (alice, mut alice_rx) = connect(&mut server);

        server.handle_command(ServerCommand::LineTooLong { client_id: alice });

        assert_eq!(drain(&mut alice_rx), vec!["[SERVER] Error: line too long"]);
    }
}
