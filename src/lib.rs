//! Chat Room Server Library
//!
//! A line-oriented TCP chat room: many clients share one room, pick unique
//! names, and talk through a small command set.
//!
//! # Features
//! - Name handshake (`OK` / `TAKEN`) with retry
//! - Room broadcast with per-user mute
//! - Elected administrator with deterministic succession by join order
//! - Private messages (`@user text`)
//! - `/rename`, `/users`, `/admin`, `/whoami`, `/uptime`, `/ping`, `/calc`
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor owning the `Registry`
//! - Each connection has a session task talking to the server and a
//!   writer task draining the connection's outbound queue
//! - The actor only `try_send`s into outbound queues, so a stalled peer
//!   never stalls the room
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use chatroom_server::{serve, Config};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:9090").await.unwrap();
//!     serve(listener, Config::default()).await;
//! }
//! ```

pub mod broadcast;
pub mod client;
pub mod codec;
pub mod command;
pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use client::Client;
pub use codec::ChatCodec;
pub use command::{CalcOutcome, Calculation, Command, Operator};
pub use config::Config;
pub use error::{AppError, CommandError, SendError};
pub use handler::{handle_connection, handle_session, serve};
pub use message::ServerMessage;
pub use registry::Registry;
pub use server::{ChatServer, Flow, ServerCommand};
pub use types::{ClientId, Role, Timestamp};
