//! Scripted mock Electrum server for integration tests.
//!
//! Accepts one connection at a time, feeds inbound request lines to a
//! programmable responder, and lets tests push notifications or kill the
//! connection at will.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use electrum_spv::ServerAddress;

/// Maps `(id, method, params)` of an inbound request to a full response
/// object, or `None` to leave the call hanging.
pub type Responder = Arc<dyn Fn(u64, &str, &[Value]) -> Option<Value> + Send + Sync>;

/// A success response for `id`.
pub fn ok(id: u64, result: Value) -> Value {
    json!({"id": id, "result": result})
}

/// An error response for `id`.
pub fn rpc_err(id: u64, error: Value) -> Value {
    json!({"id": id, "error": error})
}

/// An address in the dynamic port range that refuses connections.
pub async fn refused_address() -> ServerAddress {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    ServerAddress::new("127.0.0.1", port)
}

struct LiveConn {
    writer: OwnedWriteHalf,
    cancel: CancellationToken,
}

struct ServerState {
    current: Mutex<Option<LiveConn>>,
    connections_tx: watch::Sender<usize>,
}

pub struct MockServer {
    address: ServerAddress,
    state: Arc<ServerState>,
    connections_rx: watch::Receiver<usize>,
}

impl MockServer {
    pub async fn start(responder: Responder) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (connections_tx, connections_rx) = watch::channel(0);
        let state = Arc::new(ServerState {
            current: Mutex::new(None),
            connections_tx,
        });

        let accept_state = state.clone();
        tokio::spawn(async move {
            let mut accepted = 0usize;
            while let Ok((stream, _)) = listener.accept().await {
                accepted += 1;
                let _ = accept_state.connections_tx.send(accepted);

                let (read_half, write_half) = stream.into_split();
                let cancel = CancellationToken::new();
                *accept_state.current.lock().await = Some(LiveConn {
                    writer: write_half,
                    cancel: cancel.clone(),
                });

                let state = accept_state.clone();
                let responder = responder.clone();
                tokio::spawn(async move {
                    let mut lines = BufReader::new(read_half).lines();
                    loop {
                        let line = tokio::select! {
                            _ = cancel.cancelled() => break,
                            line = lines.next_line() => match line {
                                Ok(Some(line)) => line,
                                _ => break,
                            },
                        };
                        let request: Value = match serde_json::from_str(&line) {
                            Ok(request) => request,
                            Err(_) => continue,
                        };
                        let id = request["id"].as_u64().unwrap();
                        let method = request["method"].as_str().unwrap().to_string();
                        let params = request["params"].as_array().cloned().unwrap_or_default();
                        if let Some(response) = responder(id, &method, &params) {
                            state.write_line(&response.to_string()).await;
                        }
                    }
                });
            }
        });

        Self {
            address: ServerAddress::new("127.0.0.1", port),
            state,
            connections_rx,
        }
    }

    pub fn address(&self) -> ServerAddress {
        self.address.clone()
    }

    /// Total connections accepted so far.
    pub fn connection_count(&self) -> usize {
        *self.connections_rx.borrow()
    }

    /// Wait until at least `n` connections have been accepted.
    pub async fn wait_for_connections(&self, n: usize) {
        let mut rx = self.connections_rx.clone();
        while *rx.borrow() < n {
            rx.changed().await.unwrap();
        }
    }

    /// Push a notification frame to the connected client.
    pub async fn notify(&self, method: &str, params: Value) {
        self.state.write_line(&json!({"method": method, "params": params}).to_string()).await;
    }

    /// Push an arbitrary raw line to the connected client.
    pub async fn send_line(&self, line: &str) {
        self.state.write_line(line).await;
    }

    /// Kill the current connection.
    pub async fn close_current(&self) {
        if let Some(conn) = self.state.current.lock().await.take() {
            conn.cancel.cancel();
            drop(conn.writer);
        }
    }
}

impl ServerState {
    async fn write_line(&self, line: &str) {
        let mut guard = self.current.lock().await;
        if let Some(conn) = guard.as_mut() {
            let framed = format!("{line}\n");
            let _ = conn.writer.write_all(framed.as_bytes()).await;
        }
    }
}
