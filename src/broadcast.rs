//! Best-effort fan-out to every registered connection
//!
//! Sends go to a snapshot of the registry. A failed send never stops the
//! fan-out; the failed peers are handed back to the caller, which removes
//! them once the whole snapshot has been drained.

use tracing::warn;

use crate::message::ServerMessage;
use crate::registry::Registry;
use crate::types::ClientId;

/// A connection whose outbound queue rejected a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadPeer {
    pub username: String,
    pub client_id: ClientId,
}

/// Send `msg` to every registered user, returning the ones that failed
pub fn broadcast(registry: &Registry, msg: &ServerMessage) -> Vec<DeadPeer> {
    let mut dead = Vec::new();

    for (username, client) in registry.snapshot() {
        if let Err(e) = client.send(msg.clone()) {
            warn!("Dropping {} ({}): {}", username, client.id, e);
            dead.push(DeadPeer {
                username,
                client_id: client.id,
            });
        }
    }

    dead
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::client::Client;

    #[test]
    fn test_broadcast_reaches_everyone() {
        let mut registry = Registry::new();
        let mut receivers = Vec::new();
        for name in ["alice", "bob", "carol"] {
            let (tx, rx) = mpsc::channel(4);
            registry.try_register(name, Client::new(ClientId::new(), tx)).unwrap();
            receivers.push(rx);
        }

        let dead = broadcast(&registry, &ServerMessage::Pong);

        assert!(dead.is_empty());
        for rx in &mut receivers {
            assert_eq!(rx.try_recv().unwrap(), ServerMessage::Pong);
        }
    }

    #[test]
    fn test_broadcast_isolates_failed_peer() {
        let mut registry = Registry::new();
        let (alice_tx, mut alice_rx) = mpsc::channel(4);
        let (bob_tx, bob_rx) = mpsc::channel(4);
        let (carol_tx, mut carol_rx) = mpsc::channel(4);
        let bob_id = ClientId::new();
        registry.try_register("alice", Client::new(ClientId::new(), alice_tx)).unwrap();
        registry.try_register("bob", Client::new(bob_id, bob_tx)).unwrap();
        registry.try_register("carol", Client::new(ClientId::new(), carol_tx)).unwrap();
        drop(bob_rx);

        let dead = broadcast(&registry, &ServerMessage::Pong);

        assert_eq!(
            dead,
            vec![DeadPeer {
                username: "bob".to_string(),
                client_id: bob_id,
            }]
        );
        assert_eq!(alice_rx.try_recv().unwrap(), ServerMessage::Pong);
        assert_eq!(carol_rx.try_recv().unwrap(), ServerMessage::Pong);
        // Broadcasting never mutates the registry
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_broadcast_treats_full_queue_as_dead() {
        let mut registry = Registry::new();
        let (tx, _rx) = mpsc::channel(1);
        registry.try_register("slow", Client::new(ClientId::new(), tx)).unwrap();

        assert!(broadcast(&registry, &ServerMessage::Pong).is_empty());
        assert_eq!(broadcast(&registry, &ServerMessage::Pong).len(), 1);
    }
}
