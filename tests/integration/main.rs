//! Rendezvous integration test harness.
//!
//! Every test binds its own server on an ephemeral loopback port and talks
//! to it with real WebSocket clients, so tests are independent and can run
//! in parallel.
//!
//!   cargo test --test integration

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use rendezvous_api::ApiState;
use rendezvous_services::{ConnectionManager, PeerRegistry};

mod monitoring;
mod sessions;
mod signaling;

/// How long a client waits for an expected frame.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a client listens before concluding nothing is coming.
pub const QUIET_PERIOD: Duration = Duration::from_millis(200);

// ── Server ────────────────────────────────────────────────────────────────────

pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl TestServer {
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind test listener")?;
        let addr = listener.local_addr()?;
        let state = ApiState::new(ConnectionManager::new(PeerRegistry::new()));

        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(rendezvous_api::serve_listener(state, listener, async move {
            let _ = rx.await;
        }));

        Ok(Self {
            addr,
            shutdown: Some(tx),
            task,
        })
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        let url = format!("http://{}{}", self.addr, path);
        reqwest::get(&url)
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()?
            .json::<Value>()
            .await
            .context("failed to parse response")
    }

    /// Poll `/status` until `online_peers` reaches `expected`.
    pub async fn wait_for_online(&self, expected: u64) -> Result<Value> {
        let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
        loop {
            let status = self.get("/status").await?;
            if status["online_peers"].as_u64() == Some(expected) {
                return Ok(status);
            }
            if tokio::time::Instant::now() >= deadline {
                bail!("online_peers never reached {expected}: {status}");
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task.abort();
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

pub struct Client {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Client {
    pub async fn connect(server: &TestServer) -> Result<Self> {
        let (ws, _) = connect_async(server.ws_url())
            .await
            .context("websocket handshake failed")?;
        Ok(Self { ws })
    }

    pub async fn send(&mut self, message: Value) -> Result<()> {
        self.send_raw(&message.to_string()).await
    }

    pub async fn send_raw(&mut self, text: &str) -> Result<()> {
        self.ws
            .send(Message::Text(text.to_string()))
            .await
            .context("websocket send failed")
    }

    pub async fn send_binary(&mut self, data: Vec<u8>) -> Result<()> {
        self.ws
            .send(Message::Binary(data))
            .await
            .context("websocket send failed")
    }

    /// Next text frame, parsed as JSON.
    pub async fn recv(&mut self) -> Result<Value> {
        let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
        loop {
            let frame = tokio::time::timeout_at(deadline, self.ws.next())
                .await
                .context("timed out waiting for a frame")?
                .context("server closed the connection")??;
            match frame {
                Message::Text(text) => return serde_json::from_str(&text).context("non-JSON frame"),
                Message::Close(_) => bail!("server closed the connection"),
                _ => continue,
            }
        }
    }

    /// Skip frames until one of type `kind` arrives.
    pub async fn recv_kind(&mut self, kind: &str) -> Result<Value> {
        loop {
            let frame = self.recv().await?;
            if frame["type"] == kind {
                return Ok(frame);
            }
        }
    }

    /// True if no frame arrives within the quiet period.
    pub async fn is_quiet(&mut self) -> bool {
        tokio::time::timeout(QUIET_PERIOD, self.ws.next())
            .await
            .is_err()
    }

    pub async fn register(&mut self, device_id: &str, capabilities: &[&str], specializations: &[&str]) -> Result<Value> {
        self.send(json!({
            "type": "register",
            "device_id": device_id,
            "peer_info": {
                "capabilities": capabilities,
                "specializations": specializations,
            },
        }))
        .await?;
        let reply = self.recv_kind("registered").await?;
        assert_eq!(reply["device_id"], device_id);
        Ok(reply)
    }

    pub async fn close(mut self) -> Result<()> {
        self.ws.close(None).await.context("websocket close failed")
    }
}

/// Device ids in a `discovery_result`, sorted.
pub fn discovered_ids(result: &Value) -> Vec<String> {
    let mut ids: Vec<String> = result["peers"]
        .as_array()
        .map(|peers| {
            peers
                .iter()
                .filter_map(|p| p["device_id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    ids.sort();
    ids
}
