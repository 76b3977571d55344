//! User registry
//!
//! Maps usernames to the connection currently holding them. The registry is
//! owned by the `ChatServer` actor, so every operation runs with exclusive
//! access for its whole duration.

use std::collections::HashMap;

use crate::types::ClientId;

/// Username → connection mapping
///
/// A username is held by at most one connection at a time. The raw map is
/// never handed out; `list_names` returns an owned snapshot.
#[derive(Debug, Default)]
pub struct Registry {
    users: HashMap<String, ClientId>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name` for `client_id`
    ///
    /// Returns false without touching the existing entry if the name is taken.
    pub fn register(&mut self, name: &str, client_id: ClientId) -> bool {
        if self.users.contains_key(name) {
            return false;
        }
        self.users.insert(name.to_string(), client_id);
        true
    }

    /// Release `name`; no-op if it is not registered
    pub fn unregister(&mut self, name: &str) {
        self.users.remove(name);
    }

    /// Find the connection holding `name`
    pub fn lookup(&self, name: &str) -> Option<ClientId> {
        self.users.get(name).copied()
    }

    /// Point-in-time snapshot of registered names, sorted
    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.users.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered names
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether nobody is registered
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
