//! Error types for the chat server
//!
//! Defines connection-level errors, outbound send errors and the
//! user-visible command errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// All of these end the affected connection (or, for `Config`, server
/// startup). None of them is ever shown to a chat user.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration parsed but a value is out of range
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Channel send error (fatal - the server actor is gone)
    #[error("Channel send error")]
    ChannelSend,
}

/// Message send errors
///
/// Occurs when a connection's outbound queue rejects a message.
/// Either case is treated as a disconnect of that connection.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The peer is not draining its queue
    #[error("Channel full")]
    ChannelFull,
}

/// Errors reported back to the user who issued a command
///
/// Rendered as `[ERROR] <message>` lines. No state changes when one occurs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Handshake or rename target already registered
    #[error("The name '{0}' is already taken.")]
    NameTaken(String),

    /// Private message target is not connected
    #[error("User '{0}' not found.")]
    UserNotFound(String),

    /// `@user text` without the separating space
    #[error("Usage: @username message")]
    PrivateMessageUsage,

    /// Mute/unmute issued by a regular user
    #[error("Admin only.")]
    AdminOnly,
}
