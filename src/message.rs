//! Message protocol definitions
//!
//! Every server → client message is a typed `ServerMessage`. Its `Display`
//! impl is the wire text; the writer task appends the `\n` terminator.

use std::time::Duration;

use crate::command::{CalcOutcome, Calculation};
use crate::error::CommandError;
use crate::types::{Role, Timestamp};

/// Server → Client message
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Handshake name accepted
    HandshakeAccepted,
    /// Handshake name already in use
    HandshakeTaken,
    /// Sent privately to the first registrant
    YouAreAdmin { at: Timestamp },
    /// Sent privately after a successful handshake
    Welcome { at: Timestamp, username: String },
    /// A user joined the room
    Joined { at: Timestamp, username: String },
    /// A user left the room
    Left { at: Timestamp, username: String },
    /// Sent privately to a newly elected administrator
    PromotedToAdmin { at: Timestamp },
    /// The administrator role moved
    AdminChanged { at: Timestamp, username: String },
    /// A user changed name
    Renamed {
        at: Timestamp,
        old: String,
        new: String,
    },
    /// Room chat line
    Chat {
        at: Timestamp,
        from: String,
        content: String,
    },
    /// Private message, recipient side
    PrivateFrom {
        at: Timestamp,
        from: String,
        content: String,
    },
    /// Private message, sender confirmation
    PrivateTo {
        at: Timestamp,
        to: String,
        content: String,
    },
    /// A user was muted by the administrator
    Muted { at: Timestamp, username: String },
    /// A user was unmuted by the administrator
    Unmuted { at: Timestamp, username: String },
    /// Free text from a muted user was suppressed
    YouAreMuted,
    /// Reply to `/quit`
    Goodbye,
    /// Reply to `/ping`
    Pong,
    /// Reply to `/uptime`
    Uptime { elapsed: Duration },
    /// Reply to `/users`
    UserList {
        users: Vec<String>,
        admin: Option<String>,
    },
    /// Reply to `/admin`
    AdminIs { admin: Option<String> },
    /// Reply to `/whoami`
    WhoAmI { username: String, role: Role },
    /// Reply to `/calc`
    CalcResult {
        calc: Calculation,
        outcome: CalcOutcome,
    },
    /// Error occurred
    Error(CommandError),
}

impl std::fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerMessage::HandshakeAccepted => f.write_str("OK"),
            ServerMessage::HandshakeTaken => f.write_str("TAKEN"),
            ServerMessage::YouAreAdmin { at } => write!(f, "{} You are the administrator.", at),
            ServerMessage::Welcome { at, username } => write!(f, "{} Welcome {}!", at, username),
            ServerMessage::Joined { at, username } => {
                write!(f, "{} {} joined the chat.", at, username)
            }
            ServerMessage::Left { at, username } => write!(f, "{} {} disconnected.", at, username),
            ServerMessage::PromotedToAdmin { at } => {
                write!(f, "{} You are now the administrator.", at)
            }
            ServerMessage::AdminChanged { at, username } => {
                write!(f, "{} {} is now the administrator.", at, username)
            }
            ServerMessage::Renamed { at, old, new } => {
                write!(f, "{} {} changed name to {}.", at, old, new)
            }
            ServerMessage::Chat { at, from, content } => write!(f, "{} {}: {}", at, from, content),
            ServerMessage::PrivateFrom { at, from, content } => {
                write!(f, "{} [PM from {}] {}", at, from, content)
            }
            ServerMessage::PrivateTo { at, to, content } => {
                write!(f, "{} [PM to {}] {}", at, to, content)
            }
            ServerMessage::Muted { at, username } => {
                write!(f, "{} {} has been muted.", at, username)
            }
            ServerMessage::Unmuted { at, username } => {
                write!(f, "{} {} has been unmuted.", at, username)
            }
            ServerMessage::YouAreMuted => f.write_str("[SYSTEM] You are muted."),
            ServerMessage::Goodbye => f.write_str("[SERVER] You disconnected."),
            ServerMessage::Pong => f.write_str("Pong"),
            ServerMessage::Uptime { elapsed } => {
                write!(f, "[SERVER] Server Uptime: {}", format_clock(*elapsed))
            }
            ServerMessage::UserList { users, admin } => {
                f.write_str("Connected users:")?;
                for user in users {
                    write!(f, "\n- {}", user)?;
                    if admin.as_deref() == Some(user.as_str()) {
                        f.write_str(" (Admin)")?;
                    }
                }
                Ok(())
            }
            ServerMessage::AdminIs { admin } => {
                write!(f, "Admin: {}", admin.as_deref().unwrap_or("none"))
            }
            ServerMessage::WhoAmI { username, role } => {
                write!(f, "You are: {}\nRole: {}", username, role)
            }
            ServerMessage::CalcResult { calc, outcome } => {
                write!(f, "[CALC] {} {} {} = {}", calc.lhs, calc.op, calc.rhs, outcome)
            }
            ServerMessage::Error(err) => write!(f, "[ERROR] {}", err),
        }
    }
}

/// Convert CommandError to ServerMessage for client notification
impl From<CommandError> for ServerMessage {
    fn from(err: CommandError) -> Self {
        ServerMessage::Error(err)
    }
}

/// Format a duration as `HH:MM:SS`; hours are not capped at 24
fn format_clock(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, secs % 3600 / 60, secs % 60)
}
