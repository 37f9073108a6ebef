//! Client struct definition
//!
//! A registry entry's handle to a live connection: its identity, the
//! outbound queue drained by that connection's writer task, and a token
//! that closes the connection when the server drops it.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::ClientId;

/// Connected client handle
///
/// Cheap to clone; clones share the same outbound queue and close token.
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique identifier for this connection
    pub id: ClientId,
    /// Server → Client message channel
    pub sender: mpsc::Sender<ServerMessage>,
    /// Cancelled when the server evicts this connection
    pub closer: CancellationToken,
}

impl Client {
    /// Create a new client with the given ID and sender channel
    pub fn new(id: ClientId, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id,
            sender,
            closer: CancellationToken::new(),
        }
    }

    /// Ask the owning session to tear the connection down
    pub fn close(&self) {
        self.closer.cancel();
    }

    /// Queue a message for this client without waiting
    ///
    /// Fails if the writer task is gone or the peer has stopped reading
    /// long enough to fill the queue.
    pub fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => SendError::ChannelFull,
            TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }
}
