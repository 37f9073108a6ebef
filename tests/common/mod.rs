//! Integration test common infrastructure.
//!
//! Spawns the server on an ephemeral port and provides a line-based client.

use std::net::SocketAddr;
use std::time::Duration;

use chatroom_server::{serve, Config};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

/// Start a server on 127.0.0.1 with an OS-assigned port.
pub async fn spawn_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, Config::default()));
    addr
}

/// A test chat client.
pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

#[allow(dead_code)]
impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    /// Connect and complete the handshake, consuming the join greeting.
    pub async fn join(addr: SocketAddr, name: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client.send(name).await;
        assert_eq!(client.recv().await.as_deref(), Some("OK"));
        client.expect(&format!("{} joined the chat.", name)).await;
        client
    }

    /// Send one line.
    pub async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    /// Send raw bytes without a terminator.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    /// Next line, `None` on EOF.
    pub async fn recv(&mut self) -> Option<String> {
        self.recv_timeout(Duration::from_secs(5))
            .await
            .expect("timed out waiting for a line")
    }

    /// Next line within `dur`; `Err` if nothing arrived.
    pub async fn recv_timeout(&mut self, dur: Duration) -> Result<Option<String>, ()> {
        let mut line = String::new();
        match timeout(dur, self.reader.read_line(&mut line)).await {
            Ok(Ok(0)) => Ok(None),
            Ok(Ok(_)) => Ok(Some(line.trim_end_matches(['\r', '\n']).to_string())),
            Ok(Err(_)) => Ok(None),
            Err(_) => Err(()),
        }
    }

    /// Read lines until one contains `needle`; returns the lines read.
    pub async fn expect(&mut self, needle: &str) -> Vec<String> {
        let mut seen = Vec::new();
        loop {
            match self.recv().await {
                Some(line) => {
                    let done = line.contains(needle);
                    seen.push(line);
                    if done {
                        return seen;
                    }
                }
                None => panic!("connection closed before {:?}; saw {:?}", needle, seen),
            }
        }
    }

    /// Assert nothing arrives for a short while.
    pub async fn expect_silence(&mut self) {
        if let Ok(line) = self.recv_timeout(Duration::from_millis(200)).await {
            panic!("expected silence, got {:?}", line);
        }
    }
}
