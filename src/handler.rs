//! Connection handling
//!
//! Runs the accept loop and one session per connection: name handshake,
//! then read-dispatch-repeat until quit or disconnect, then cleanup.
//! Each session owns a writer task that drains its outbound queue into the
//! socket, so no other task ever waits on this peer's network writes.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::client::Client;
use crate::codec::ChatCodec;
use crate::command::Command;
use crate::config::Config;
use crate::error::AppError;
use crate::message::ServerMessage;
use crate::server::{ChatServer, Flow, ServerCommand};
use crate::types::ClientId;

/// Start the ChatServer actor and accept connections forever
pub async fn serve(listener: TcpListener, config: Config) {
    let config = Arc::new(config);
    let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer);
    tokio::spawn(ChatServer::new(cmd_rx).run());

    info!("ChatServer actor started");

    // Connection accept loop
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let cmd_tx = cmd_tx.clone();
                let config = Arc::clone(&config);

                // Spawn handler task for each connection
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, cmd_tx, config).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Handle a new TCP connection
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<ServerCommand>,
    config: Arc<Config>,
) -> Result<(), AppError> {
    let peer_addr = stream.peer_addr()?.to_string();
    handle_session(stream, &peer_addr, cmd_tx, &config).await
}

/// Session state machine
#[derive(Debug)]
enum SessionState {
    /// Waiting for an available name
    Handshaking,
    /// Registered; dispatching lines
    Active { username: String },
    /// Done; holds the name to clean up, if one was registered
    Terminated { username: Option<String> },
}

/// Run one session over any byte stream
///
/// Returns an error only if the final cleanup could not reach the server
/// actor; every peer-side failure just ends the session.
pub async fn handle_session<S>(
    stream: S,
    peer: &str,
    cmd_tx: mpsc::Sender<ServerCommand>,
    config: &Config,
) -> Result<(), AppError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let client_id = ClientId::new();
    info!("Client {} connected from {}", client_id, peer);

    let (reader, writer) = tokio::io::split(stream);
    let mut lines = FramedRead::new(reader, ChatCodec::new(config.max_line_length));

    // Server -> client queue, drained by the write task
    let (msg_tx, msg_rx) = mpsc::channel::<ServerMessage>(config.client_buffer);
    let client = Client::new(client_id, msg_tx);
    let mut write_task = tokio::spawn(write_loop(
        writer,
        msg_rx,
        client.closer.clone(),
        client_id,
    ));

    let session = Session { client, cmd_tx };

    let mut state = SessionState::Handshaking;
    let registered = loop {
        state = match state {
            SessionState::Handshaking => session.handshake(&mut lines).await,
            SessionState::Active { username } => session.dispatch(&mut lines, username).await,
            SessionState::Terminated { username } => break username,
        };
    };

    // Cleanup: unregister, then let the writer flush and close the socket.
    // An evicted session was already removed by the server.
    let evicted = session.client.closer.is_cancelled();
    let cleanup = match registered.filter(|_| !evicted) {
        Some(username) => session
            .cmd_tx
            .send(ServerCommand::Disconnect {
                client_id,
                username,
            })
            .await
            .map_err(|_| AppError::ChannelSend),
        None => Ok(()),
    };
    drop(session);

    if tokio::time::timeout(config.drain_timeout(), &mut write_task)
        .await
        .is_err()
    {
        debug!("Write task for {} did not drain in time", client_id);
        write_task.abort();
    }

    if evicted {
        info!("Client {} disconnected by the server", client_id);
    } else {
        info!("Client {} disconnected", client_id);
    }
    cleanup
}

/// Per-connection handles used by the state machine
struct Session {
    client: Client,
    cmd_tx: mpsc::Sender<ServerCommand>,
}

impl Session {
    /// Handshaking: one candidate name per read, terminator optional
    async fn handshake<R>(&self, lines: &mut FramedRead<R, ChatCodec>) -> SessionState
    where
        R: AsyncRead + Unpin,
    {
        let Some(line) = self.next_line(lines).await else {
            return SessionState::Terminated { username: None };
        };
        let name = line.trim().to_string();

        let result = self
            .request(|respond_to| ServerCommand::Register {
                name: name.clone(),
                client: self.client.clone(),
                respond_to,
            })
            .await;

        match result {
            Ok(Ok(role)) => {
                debug!("Client {} is '{}' ({})", self.client.id, name, role);
                lines.decoder_mut().finish_handshake();
                SessionState::Active { username: name }
            }
            Ok(Err(e)) => {
                debug!("Client {} may retry: {}", self.client.id, e);
                SessionState::Handshaking
            }
            Err(e) => {
                error!("Handshake for {} failed: {}", self.client.id, e);
                SessionState::Terminated { username: None }
            }
        }
    }

    /// Active: hand one line to the server and adopt the returned name
    async fn dispatch<R>(&self, lines: &mut FramedRead<R, ChatCodec>, username: String) -> SessionState
    where
        R: AsyncRead + Unpin,
    {
        let Some(line) = self.next_line(lines).await else {
            return SessionState::Terminated {
                username: Some(username),
            };
        };
        let line = line.trim();
        if line.is_empty() {
            return SessionState::Active { username };
        }

        let command = Command::parse(line);
        let result = self
            .request(|respond_to| ServerCommand::Execute {
                client_id: self.client.id,
                username: username.clone(),
                command,
                respond_to,
            })
            .await;

        match result {
            Ok(Flow::Continue { username }) => SessionState::Active { username },
            Ok(Flow::Terminate) => SessionState::Terminated {
                username: Some(username),
            },
            Err(e) => {
                error!("Dispatch for {} failed: {}", self.client.id, e);
                SessionState::Terminated {
                    username: Some(username),
                }
            }
        }
    }

    /// Next complete line, or `None` once the peer is gone
    ///
    /// The peer is gone on EOF, on a read error, when the write task has
    /// stopped because a write failed, or when the server evicted it.
    async fn next_line<R>(&self, lines: &mut FramedRead<R, ChatCodec>) -> Option<String>
    where
        R: AsyncRead + Unpin,
    {
        tokio::select! {
            next = lines.next() => match next {
                Some(Ok(line)) => Some(line),
                Some(Err(e)) => {
                    debug!("Read error for {}: {}", self.client.id, e);
                    None
                }
                None => {
                    debug!("Client {} closed the connection", self.client.id);
                    None
                }
            },
            _ = self.client.sender.closed() => {
                debug!("Write side of {} closed", self.client.id);
                None
            }
            _ = self.client.closer.cancelled() => {
                debug!("Client {} evicted by the server", self.client.id);
                None
            }
        }
    }

    /// Send a command to the server actor and wait for its answer
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ServerCommand,
    ) -> Result<T, AppError> {
        let (respond_to, response) = oneshot::channel();
        self.cmd_tx
            .send(make(respond_to))
            .await
            .map_err(|_| AppError::ChannelSend)?;
        response.await.map_err(|_| AppError::ChannelSend)
    }
}

/// Drain the outbound queue into the socket, one line per message
///
/// Ends when every sender is gone or a write fails; either way the socket's
/// write side is shut down. An evicted peer is not drained at all: its
/// socket may be stalled, so the writer stops as soon as `closer` fires.
async fn write_loop<W>(
    writer: W,
    mut msg_rx: mpsc::Receiver<ServerMessage>,
    closer: CancellationToken,
    client_id: ClientId,
) where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(writer, LinesCodec::new());

    let drain = async {
        while let Some(msg) = msg_rx.recv().await {
            if let Err(e) = sink.send(msg.to_string()).await {
                debug!("Write failed for {}: {}", client_id, e);
                break;
            }
        }
        msg_rx.close();
        let _ = SinkExt::<String>::close(&mut sink).await;
    };

    tokio::select! {
        _ = drain => debug!("Write task ended for {}", client_id),
        _ = closer.cancelled() => debug!("Write task for {} stopped on eviction", client_id),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines, ReadHalf};
    use tokio::io::DuplexStream;
    use tokio::task::JoinHandle;

    use super::*;

    struct Harness {
        reader: Lines<BufReader<ReadHalf<DuplexStream>>>,
        writer: tokio::io::WriteHalf<DuplexStream>,
        session: JoinHandle<Result<(), AppError>>,
    }

    fn spawn_actor() -> mpsc::Sender<ServerCommand> {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        tokio::spawn(ChatServer::new(cmd_rx).run());
        cmd_tx
    }

    /// Open a session whose socket buffers at most `capacity` bytes
    fn connect(cmd_tx: mpsc::Sender<ServerCommand>, config: Config, capacity: usize) -> Harness {
        let (client, server_side) = tokio::io::duplex(capacity);
        let session = tokio::spawn(async move {
            handle_session(server_side, "duplex", cmd_tx, &config).await
        });

        let (read, writer) = tokio::io::split(client);
        Harness {
            reader: BufReader::new(read).lines(),
            writer,
            session,
        }
    }

    fn start() -> Harness {
        connect(spawn_actor(), Config::default(), 4096)
    }

    impl Harness {
        async fn next(&mut self) -> Option<String> {
            tokio::time::timeout(Duration::from_secs(5), self.reader.next_line())
                .await
                .expect("timed out")
                .unwrap()
        }

        async fn send(&mut self, bytes: &[u8]) {
            self.writer.write_all(bytes).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_handshake_retry_after_taken() {
        let mut h = start();

        h.send(b"   \n").await;
        assert_eq!(h.next().await.as_deref(), Some("TAKEN"));

        h.send(b"alice\n").await;
        assert_eq!(h.next().await.as_deref(), Some("OK"));
        assert!(h.next().await.unwrap().ends_with("You are the administrator."));
        assert!(h.next().await.unwrap().ends_with("Welcome alice!"));
        assert!(h.next().await.unwrap().ends_with("alice joined the chat."));
    }

    #[tokio::test]
    async fn test_unterminated_name_accepted() {
        let mut h = start();

        h.send(b"alice").await;
        assert_eq!(h.next().await.as_deref(), Some("OK"));
        assert!(h.next().await.unwrap().ends_with("You are the administrator."));
        assert!(h.next().await.unwrap().ends_with("Welcome alice!"));
        assert!(h.next().await.unwrap().ends_with("alice joined the chat."));

        // Commands after the handshake are newline framed
        h.send(b"/pi").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.send(b"ng\n").await;
        assert_eq!(h.next().await.as_deref(), Some("Pong"));
    }

    #[tokio::test]
    async fn test_oversized_line_does_not_end_session() {
        let config = Config {
            max_line_length: 16,
            ..Config::default()
        };
        let mut h = connect(spawn_actor(), config, 4096);
        h.send(b"alice\n").await;
        for _ in 0..4 {
            h.next().await;
        }

        h.send(&[b'x'; 40]).await;
        h.send(b"\n/ping\n").await;

        assert_eq!(h.next().await.as_deref(), Some("Pong"));
    }

    #[tokio::test]
    async fn test_slow_reader_is_disconnected() {
        let cmd_tx = spawn_actor();
        let config = Config {
            client_buffer: 8,
            drain_timeout_ms: 100,
            ..Config::default()
        };

        let mut talker = connect(cmd_tx.clone(), config.clone(), 1 << 16);
        talker.send(b"talker\n").await;
        for _ in 0..4 {
            talker.next().await;
        }

        // Never reads, so its socket and then its queue fill up
        let mut slow = connect(cmd_tx, config, 64);
        slow.send(b"slow\n").await;
        assert!(talker.next().await.unwrap().ends_with("slow joined the chat."));

        let mut evicted = false;
        for i in 0..200 {
            talker.send(format!("msg {}\n", i).as_bytes()).await;
            let echo = format!("talker: msg {}", i);
            loop {
                let line = talker.next().await.unwrap();
                if line.ends_with("slow disconnected.") {
                    evicted = true;
                }
                if line.ends_with(&echo) {
                    break;
                }
            }
            if evicted {
                break;
            }
        }
        assert!(evicted);

        // The evicted session ends on its own and closes its socket
        tokio::time::timeout(Duration::from_secs(5), &mut slow.session)
            .await
            .expect("slow session still running")
            .unwrap()
            .unwrap();
        let mut rest = Vec::new();
        let mut slow_reader = slow.reader.into_inner();
        tokio::time::timeout(Duration::from_secs(5), slow_reader.read_to_end(&mut rest))
            .await
            .expect("socket still open")
            .unwrap();

        talker.send(b"/users\n").await;
        assert_eq!(talker.next().await.as_deref(), Some("Connected users:"));
        assert_eq!(talker.next().await.as_deref(), Some("- talker (Admin)"));
    }

    #[tokio::test]
    async fn test_partial_and_batched_lines() {
        let mut h = start();
        h.send(b"alice\n").await;
        for _ in 0..4 {
            h.next().await;
        }

        h.send(b"/pi").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.send(b"ng\r\n\n/who").await;
        h.send(b"ami\n").await;

        assert_eq!(h.next().await.as_deref(), Some("Pong"));
        assert_eq!(h.next().await.as_deref(), Some("You are: alice"));
        assert_eq!(h.next().await.as_deref(), Some("Role: Administrator"));
    }

    #[tokio::test]
    async fn test_quit_closes_connection() {
        let mut h = start();
        h.send(b"alice\n").await;
        for _ in 0..4 {
            h.next().await;
        }

        h.send(b"/quit\n").await;

        assert_eq!(h.next().await.as_deref(), Some("[SERVER] You disconnected."));
        assert_eq!(h.next().await, None);
        h.session.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_close_during_handshake() {
        let h = start();
        let Harness {
            reader,
            writer,
            session,
        } = h;
        drop(writer);
        drop(reader);

        session.await.unwrap().unwrap();
    }
}
