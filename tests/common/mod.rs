//! Test helpers for end-to-end tests.
//!
//! Starts a relay on an OS-assigned port and provides a small STOMP client
//! over tokio-tungstenite.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use canvas_relay::stomp::{parse_frames, Command, Frame};
use canvas_relay::web::WebServer;
use canvas_relay::Config;

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait before concluding that nothing is coming.
pub const QUIET_PERIOD: Duration = Duration::from_millis(200);

/// Configuration bound to localhost on an ephemeral port.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config
}

/// Start a relay and return its address.
pub async fn start_server(config: Config) -> SocketAddr {
    WebServer::new(&config)
        .expect("valid config")
        .run_with_addr()
        .await
        .expect("server starts")
}

/// A STOMP client over a WebSocket connection.
pub struct StompClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    pending: Vec<Frame>,
}

impl StompClient {
    /// Open a WebSocket to `path` without sending CONNECT.
    pub async fn open(addr: SocketAddr, path: &str) -> Self {
        let url = format!("ws://{addr}{path}");
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .expect("WebSocket handshake");
        Self {
            ws,
            pending: Vec::new(),
        }
    }

    /// Open a WebSocket to `/canvaWs` and complete the STOMP handshake.
    pub async fn connect(addr: SocketAddr) -> Self {
        let mut client = Self::open(addr, "/canvaWs").await;
        client
            .send(
                Frame::new(Command::Connect)
                    .header("accept-version", "1.1,1.2")
                    .header("host", "localhost"),
            )
            .await;
        let connected = client.recv().await;
        assert_eq!(connected.command, Command::Connected);
        client
    }

    /// Subscribe and wait until the server has registered the subscription.
    pub async fn subscribe(&mut self, id: &str, destination: &str) {
        let receipt = format!("sub-{id}");
        self.send(
            Frame::new(Command::Subscribe)
                .header("id", id)
                .header("destination", destination)
                .header("receipt", receipt.as_str()),
        )
        .await;
        self.expect_receipt(&receipt).await;
    }

    /// SEND a JSON body and wait for the server to finish routing it.
    pub async fn send_json(&mut self, destination: &str, body: &str, receipt: &str) {
        self.send(
            Frame::new(Command::Send)
                .header("destination", destination)
                .header("content-type", "application/json")
                .header("content-length", body.len().to_string())
                .header("receipt", receipt)
                .body(body.as_bytes().to_vec()),
        )
        .await;
        self.expect_receipt(receipt).await;
    }

    /// Write one frame as a text message.
    pub async fn send(&mut self, frame: Frame) {
        let text = String::from_utf8(frame.to_bytes()).expect("UTF-8 frame");
        self.send_raw(&text).await;
    }

    /// Write a raw text message.
    pub async fn send_raw(&mut self, text: &str) {
        self.ws
            .send(Message::Text(text.to_string()))
            .await
            .expect("send");
    }

    /// Read the next frame.
    pub async fn recv(&mut self) -> Frame {
        self.try_recv(DEFAULT_TIMEOUT)
            .await
            .expect("timed out waiting for STOMP frame")
    }

    /// Read the next frame, or `None` if nothing arrives in `wait` or the
    /// socket closes.
    pub async fn try_recv(&mut self, wait: Duration) -> Option<Frame> {
        if !self.pending.is_empty() {
            return Some(self.pending.remove(0));
        }
        loop {
            let msg = timeout(wait, self.ws.next()).await.ok()??.ok()?;
            let data = match msg {
                Message::Text(text) => text.into_bytes(),
                Message::Binary(data) => data,
                Message::Close(_) => return None,
                _ => continue,
            };
            let mut frames = parse_frames(&data, usize::MAX).expect("server frame parses");
            if frames.is_empty() {
                continue;
            }
            let first = frames.remove(0);
            self.pending.extend(frames);
            return Some(first);
        }
    }

    /// Read frames until the RECEIPT for `receipt` arrives. Anything else is
    /// kept for later `recv` calls.
    pub async fn expect_receipt(&mut self, receipt: &str) {
        let mut others = Vec::new();
        loop {
            let frame = self.recv().await;
            if frame.command == Command::Receipt && frame.get("receipt-id") == Some(receipt) {
                break;
            }
            assert_ne!(frame.command, Command::Error, "unexpected ERROR: {frame:?}");
            others.push(frame);
        }
        others.append(&mut self.pending);
        self.pending = others;
    }

    /// Whether the server has closed the socket.
    pub async fn is_closed(&mut self) -> bool {
        loop {
            match timeout(DEFAULT_TIMEOUT, self.ws.next()).await {
                Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => return true,
                Ok(Some(Ok(_))) => continue,
                Err(_) => return false,
            }
        }
    }

    /// Send a WebSocket Ping and count the Pongs that come back before
    /// the line goes quiet.
    pub async fn ping(&mut self, payload: &[u8]) -> usize {
        self.ws
            .send(Message::Ping(payload.to_vec()))
            .await
            .expect("ping sent");
        let mut pongs = 0;
        while let Ok(Some(Ok(msg))) = timeout(QUIET_PERIOD, self.ws.next()).await {
            if let Message::Pong(data) = msg {
                assert_eq!(data, payload);
                pongs += 1;
            }
        }
        pongs
    }

    /// Close the socket.
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Poll the stats endpoint until `connections` reaches `expected`.
pub async fn wait_for_connections(addr: SocketAddr, expected: u64) -> bool {
    let deadline = tokio::time::Instant::now() + DEFAULT_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if stats(addr).await["connections"] == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Fetch `/api/stats` with a bare HTTP/1.1 request.
pub async fn stats(addr: SocketAddr) -> serde_json::Value {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut stream = TcpStream::connect(addr).await.expect("connect");
    let request = format!("GET /api/stats HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.expect("write");
    let mut response = String::new();
    stream.read_to_string(&mut response).await.expect("read");

    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body)
        .unwrap_or_default();
    serde_json::from_str(body).expect("stats JSON")
}
