//! Registry of active users
//!
//! The single table of registered connections, their join order, the
//! administrator and the muted set. Owned exclusively by the `ChatServer`
//! actor, so every operation here is atomic with respect to every other.
//! Nothing in this module performs I/O.

use std::collections::{HashMap, HashSet};

use crate::client::Client;
use crate::error::CommandError;
use crate::types::{ClientId, Role};

/// Shared chat room state
///
/// Invariants:
/// - `order` is a permutation of the keys of `connections`
/// - `admin`, when set, is a key of `connections`
#[derive(Debug, Default)]
pub struct Registry {
    /// Username -> connection handle
    connections: HashMap<String, Client>,
    /// Usernames in join order
    order: Vec<String>,
    /// Current administrator
    admin: Option<String>,
    /// Silenced usernames
    muted: HashSet<String>,
}

/// Result of removing a user
#[derive(Debug)]
pub struct Removed {
    pub client: Client,
    /// Set when the removed user was administrator and someone took over
    pub promoted: Option<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` for `client`
    ///
    /// The first registrant while no administrator exists becomes
    /// administrator. Blank names are refused like taken ones.
    pub fn try_register(&mut self, name: &str, client: Client) -> Result<Role, CommandError> {
        if name.is_empty() || self.connections.contains_key(name) {
            return Err(CommandError::NameTaken(name.to_string()));
        }

        self.connections.insert(name.to_string(), client);
        self.order.push(name.to_string());

        if self.admin.is_none() {
            self.admin = Some(name.to_string());
            Ok(Role::Administrator)
        } else {
            Ok(Role::Regular)
        }
    }

    /// Remove `name` if it still belongs to connection `id`
    ///
    /// Returns `None` when the name is absent or now owned by another
    /// connection. Removing the administrator elects a successor.
    pub fn remove(&mut self, name: &str, id: ClientId) -> Option<Removed> {
        if self.connections.get(name)?.id != id {
            return None;
        }

        let client = self.connections.remove(name)?;
        self.muted.remove(name);
        self.order.retain(|n| n != name);

        let promoted = if self.admin.as_deref() == Some(name) {
            self.elect_admin()
        } else {
            None
        };

        Some(Removed { client, promoted })
    }

    /// Move the entry for `old` to `new`, keeping its join position,
    /// administrator role and mute status
    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), CommandError> {
        if self.connections.contains_key(new) {
            return Err(CommandError::NameTaken(new.to_string()));
        }
        let Some(client) = self.connections.remove(old) else {
            return Err(CommandError::UserNotFound(old.to_string()));
        };

        self.connections.insert(new.to_string(), client);
        if let Some(slot) = self.order.iter_mut().find(|n| *n == old) {
            *slot = new.to_string();
        }
        if self.admin.as_deref() == Some(old) {
            self.admin = Some(new.to_string());
        }
        if self.muted.remove(old) {
            self.muted.insert(new.to_string());
        }
        Ok(())
    }

    /// Usernames in join order plus the administrator, read together
    pub fn snapshot_users(&self) -> (Vec<String>, Option<String>) {
        (self.order.clone(), self.admin.clone())
    }

    /// Copy of every `(username, client)` pair, for fan-out
    pub fn snapshot(&self) -> Vec<(String, Client)> {
        self.order
            .iter()
            .filter_map(|name| {
                self.connections
                    .get(name)
                    .map(|client| (name.clone(), client.clone()))
            })
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&Client> {
        self.connections.get(name)
    }

    /// Whether `name` is currently held by connection `id`
    pub fn is_current(&self, name: &str, id: ClientId) -> bool {
        self.connections.get(name).is_some_and(|c| c.id == id)
    }

    pub fn admin(&self) -> Option<&str> {
        self.admin.as_deref()
    }

    pub fn role_of(&self, name: &str) -> Role {
        if self.admin.as_deref() == Some(name) {
            Role::Administrator
        } else {
            Role::Regular
        }
    }

    pub fn is_muted(&self, name: &str) -> bool {
        self.muted.contains(name)
    }

    /// Mute a connected, non-administrator user
    ///
    /// Returns false (no change) for unknown users and the administrator.
    pub fn mute(&mut self, name: &str) -> bool {
        if !self.connections.contains_key(name) || self.admin.as_deref() == Some(name) {
            return false;
        }
        self.muted.insert(name.to_string())
    }

    /// Returns false if `name` was not muted
    pub fn unmute(&mut self, name: &str) -> bool {
        self.muted.remove(name)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Hand the administrator role to the earliest-joined remaining user
    fn elect_admin(&mut self) -> Option<String> {
        self.admin = self.order.first().cloned();
        self.admin.clone()
    }
}
