//! ChatServer Actor implementation
//!
//! The central actor that owns the `Registry` and applies every command.
//! Sessions talk to it over an mpsc channel; request/response commands
//! carry a oneshot sender for the answer. The actor never awaits a peer:
//! all outbound traffic is `try_send` into per-connection queues.

use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::broadcast::{broadcast, DeadPeer};
use crate::client::Client;
use crate::command::Command;
use crate::error::CommandError;
use crate::message::ServerMessage;
use crate::registry::{Registry, Removed};
use crate::types::{ClientId, Role, Timestamp};

/// Commands sent from session handlers to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// Handshake attempt with a candidate name
    Register {
        name: String,
        client: Client,
        respond_to: oneshot::Sender<Result<Role, CommandError>>,
    },
    /// One parsed line from a registered user
    Execute {
        client_id: ClientId,
        username: String,
        command: Command,
        respond_to: oneshot::Sender<Flow>,
    },
    /// Session ended after registering
    Disconnect {
        client_id: ClientId,
        username: String,
    },
}

/// What a session does after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading, under this (possibly new) name
    Continue { username: String },
    /// Stop the session
    Terminate,
}

/// The main ChatServer actor
pub struct ChatServer {
    /// Registered users, admin and mutes
    registry: Registry,
    /// Server epoch for `/uptime`
    started_at: Instant,
    /// Peers whose sends failed during the current command
    dead: Vec<DeadPeer>,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>) -> Self {
        Self {
            registry: Registry::new(),
            started_at: Instant::now(),
            dead: Vec::new(),
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

        info!("ChatServer shutting down");
    }

    /// Process a single command, then drop any peers it found dead
    pub fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Register {
                name,
                client,
                respond_to,
            } => {
                let result = self.handle_register(name, client);
                let _ = respond_to.send(result);
            }
            ServerCommand::Execute {
                client_id,
                username,
                command,
                respond_to,
            } => {
                let flow = self.handle_execute(client_id, username, command);
                let _ = respond_to.send(flow);
            }
            ServerCommand::Disconnect {
                client_id,
                username,
            } => {
                self.handle_disconnect(client_id, &username);
            }
        }

        self.reap_dead();
    }

    /// Handle a handshake attempt
    fn handle_register(&mut self, name: String, client: Client) -> Result<Role, CommandError> {
        let client_id = client.id;

        let role = match self.registry.try_register(&name, client.clone()) {
            Ok(role) => role,
            Err(e) => {
                debug!("Client {} handshake refused: {}", client_id, e);
                let _ = client.send(ServerMessage::HandshakeTaken);
                return Err(e);
            }
        };

        info!("Client {} registered as '{}'", client_id, name);
        let at = Timestamp::now();

        self.reply(&name, ServerMessage::HandshakeAccepted);
        if role == Role::Administrator {
            info!("'{}' is the administrator", name);
            self.reply(&name, ServerMessage::YouAreAdmin { at });
        }
        self.reply(
            &name,
            ServerMessage::Welcome {
                at,
                username: name.clone(),
            },
        );
        self.broadcast(ServerMessage::Joined { at, username: name });

        debug!("Total users: {}", self.registry.len());
        Ok(role)
    }

    /// Apply one command for a registered user
    fn handle_execute(&mut self, client_id: ClientId, username: String, command: Command) -> Flow {
        // Already dropped after a failed send
        if !self.registry.is_current(&username, client_id) {
            return Flow::Terminate;
        }

        debug!("'{}' -> {:?}", username, command);
        let at = Timestamp::now();

        match command {
            Command::Quit => {
                self.reply(&username, ServerMessage::Goodbye);
                return Flow::Terminate;
            }
            Command::Ping => self.reply(&username, ServerMessage::Pong),
            Command::Uptime => {
                let elapsed = self.started_at.elapsed();
                self.reply(&username, ServerMessage::Uptime { elapsed });
            }
            Command::Users => {
                let (users, admin) = self.registry.snapshot_users();
                self.reply(&username, ServerMessage::UserList { users, admin });
            }
            Command::Admin => {
                let admin = self.registry.admin().map(str::to_string);
                self.reply(&username, ServerMessage::AdminIs { admin });
            }
            Command::WhoAmI => {
                let role = self.registry.role_of(&username);
                let msg = ServerMessage::WhoAmI {
                    username: username.clone(),
                    role,
                };
                self.reply(&username, msg);
            }
            Command::Rename(new) => match self.registry.rename(&username, &new) {
                Ok(()) => {
                    info!("'{}' renamed to '{}'", username, new);
                    self.broadcast(ServerMessage::Renamed {
                        at,
                        old: username,
                        new: new.clone(),
                    });
                    return Flow::Continue { username: new };
                }
                Err(e) => self.reply(&username, e.into()),
            },
            Command::Private { target, text } => {
                self.handle_private(&username, target, text, at);
            }
            Command::PrivateUsage => {
                self.reply(&username, CommandError::PrivateMessageUsage.into());
            }
            Command::Calc(calc) => {
                let outcome = calc.evaluate();
                self.reply(&username, ServerMessage::CalcResult { calc, outcome });
            }
            Command::Mute(target) => self.handle_mute(&username, target, true, at),
            Command::Unmute(target) => self.handle_mute(&username, target, false, at),
            Command::Chat(content) => {
                if self.registry.is_muted(&username) {
                    self.reply(&username, ServerMessage::YouAreMuted);
                } else {
                    self.broadcast(ServerMessage::Chat {
                        at,
                        from: username.clone(),
                        content,
                    });
                }
            }
            Command::Ignored => {}
        }

        Flow::Continue { username }
    }

    /// Handle `@target text`
    fn handle_private(&mut self, username: &str, target: String, text: String, at: Timestamp) {
        if self.registry.get(&target).is_none() {
            self.reply(username, CommandError::UserNotFound(target).into());
            return;
        }

        self.reply(
            &target,
            ServerMessage::PrivateFrom {
                at,
                from: username.to_string(),
                content: text.clone(),
            },
        );
        // Self-addressed messages are delivered once
        if target != username {
            self.reply(
                username,
                ServerMessage::PrivateTo {
                    at,
                    to: target,
                    content: text,
                },
            );
        }
    }

    /// Handle `/mute` and `/unmute`
    fn handle_mute(&mut self, username: &str, target: Option<String>, mute: bool, at: Timestamp) {
        if self.registry.role_of(username) != Role::Administrator {
            self.reply(username, CommandError::AdminOnly.into());
            return;
        }
        let Some(target) = target else {
            return;
        };

        if mute {
            if self.registry.mute(&target) {
                info!("'{}' muted '{}'", username, target);
                self.broadcast(ServerMessage::Muted { at, username: target });
            }
        } else if self.registry.unmute(&target) {
            info!("'{}' unmuted '{}'", username, target);
            self.broadcast(ServerMessage::Unmuted { at, username: target });
        }
    }

    /// Handle a session ending
    fn handle_disconnect(&mut self, client_id: ClientId, username: &str) {
        match self.registry.remove(username, client_id) {
            Some(removed) => {
                info!("'{}' ({}) disconnected", username, client_id);
                self.announce_departure(username, removed);
            }
            None => debug!("'{}' ({}) was already removed", username, client_id),
        }
    }

    /// Notify the room about a removal and any resulting election
    fn announce_departure(&mut self, username: &str, removed: Removed) {
        let at = Timestamp::now();

        if let Some(admin) = removed.promoted {
            info!("'{}' is now the administrator", admin);
            self.reply(&admin, ServerMessage::PromotedToAdmin { at });
            self.broadcast(ServerMessage::AdminChanged { at, username: admin });
        }
        self.broadcast(ServerMessage::Left {
            at,
            username: username.to_string(),
        });

        debug!("Total users: {}", self.registry.len());
    }

    /// Remove every peer that failed a send
    ///
    /// Each removal may broadcast again and find more dead peers; every
    /// pass shrinks the registry, so the loop terminates.
    fn reap_dead(&mut self) {
        while let Some(peer) = self.dead.pop() {
            if let Some(removed) = self.registry.remove(&peer.username, peer.client_id) {
                info!("'{}' ({}) dropped after failed send", peer.username, peer.client_id);
                removed.client.close();
                self.announce_departure(&peer.username, removed);
            }
        }
    }

    /// Send to one registered user, recording the peer if it fails
    fn reply(&mut self, username: &str, msg: ServerMessage) {
        let Some(client) = self.registry.get(username) else {
            return;
        };
        if let Err(e) = client.send(msg) {
            debug!("Reply to '{}' failed: {}", username, e);
            self.dead.push(DeadPeer {
                username: username.to_string(),
                client_id: client.id,
            });
        }
    }

    /// Fan out to the whole room, recording failed peers
    fn broadcast(&mut self, msg: ServerMessage) {
        let dead = broadcast(&self.registry, &msg);
        self.dead.extend(dead);
    }
}
