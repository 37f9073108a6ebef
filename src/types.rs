//! Basic type definitions for the chat server
//!
//! Provides small value types shared by every component:
//! - `ClientId`: UUID-based connection identity
//! - `Role`: administrator or regular user
//! - `Timestamp`: wall-clock time rendered as `[HH:MM:SS]`

use chrono::{Local, NaiveTime};
use uuid::Uuid;

/// Unique client identifier (newtype pattern)
///
/// Wraps a UUID v4. A connection keeps its id for its whole lifetime,
/// across renames, so cleanup can tell a stale entry from a new
/// connection that reused the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Create a new random client ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of a registered user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Administrator,
    Regular,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Administrator => f.write_str("Administrator"),
            Role::Regular => f.write_str("Regular user"),
        }
    }
}

/// Server wall-clock time attached to room notices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp(pub NaiveTime);

impl Timestamp {
    pub fn now() -> Self {
        Self(Local::now().time())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0.format("%H:%M:%S"))
    }
}
