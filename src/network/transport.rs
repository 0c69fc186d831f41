//! Line-delimited JSON-RPC transport over one TCP socket.
//!
//! One worker task owns the socket, the pending-call table and the
//! subscription registry; everything else talks to it through the command
//! channel. The worker matches responses to calls by id, dispatches
//! notifications to subscription handlers, and reports lifecycle
//! transitions to registered observers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::error::{TransportError, TransportResult};
use crate::network::subscriptions::{NotificationHandler, SubscriptionRegistry};
use crate::network::wire::{parse_incoming, Incoming, RawRequest};
use crate::types::ServerAddress;

/// Lifecycle states of one transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Starting,
    Running,
    Stopping,
    Terminated,
}

/// State transitions delivered to observers. `Terminated` arrives exactly
/// once per transport, after every pending call has been failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    Running,
    Terminated {
        from: TransportState,
    },
}

type ReplySender = oneshot::Sender<TransportResult<Value>>;

enum Command {
    Call {
        method: String,
        params: Vec<Value>,
        reply: ReplySender,
    },
    Subscribe {
        method: String,
        params: Vec<Value>,
        handler: NotificationHandler,
        reply: ReplySender,
    },
    Unsubscribe {
        method: String,
        key: String,
    },
}

/// Handle to one connection run. Cheap to share behind an `Arc`; all
/// methods enqueue to the worker and never block the caller.
pub struct ElectrumTransport {
    server: ServerAddress,
    command_tx: mpsc::UnboundedSender<Command>,
    command_rx: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    state_rx: watch::Receiver<TransportState>,
    shared: Arc<Shared>,
    started: AtomicBool,
    connect_timeout: Duration,
    call_timeout: Option<Duration>,
}

struct Shared {
    server: ServerAddress,
    state_tx: watch::Sender<TransportState>,
    observers: Mutex<Vec<mpsc::UnboundedSender<TransportEvent>>>,
    cancel: CancellationToken,
    finished: AtomicBool,
}

impl Shared {
    fn set_state(&self, state: TransportState) {
        let _ = self.state_tx.send(state);
    }

    fn notify(&self, event: TransportEvent) {
        let mut observers = self.observers.lock().expect("observer list lock");
        observers.retain(|tx| tx.send(event).is_ok());
    }

    /// Move to `Terminated` and tell observers, exactly once.
    fn terminate(&self, from: TransportState) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        self.set_state(TransportState::Terminated);
        self.notify(TransportEvent::Terminated {
            from,
        });
    }
}

impl ElectrumTransport {
    pub fn new(server: ServerAddress, connect_timeout: Duration, call_timeout: Option<Duration>) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(TransportState::New);
        let shared = Arc::new(Shared {
            server: server.clone(),
            state_tx,
            observers: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
            finished: AtomicBool::new(false),
        });
        Self {
            server,
            command_tx,
            command_rx: Mutex::new(Some(command_rx)),
            state_rx,
            shared,
            started: AtomicBool::new(false),
            connect_timeout,
            call_timeout,
        }
    }

    pub fn server(&self) -> &ServerAddress {
        &self.server
    }

    pub fn state(&self) -> TransportState {
        *self.state_rx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == TransportState::Running
    }

    /// Register an observer for lifecycle transitions. Observers added
    /// before `start` see every transition.
    pub fn state_changes(&self) -> mpsc::UnboundedReceiver<TransportEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.observers.lock().expect("observer list lock").push(tx);
        rx
    }

    /// Spawn the worker. Idempotent; a second call is a no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!(server = %self.server, "transport already started");
            return;
        }
        let receiver = self
            .command_rx
            .lock()
            .expect("command receiver lock")
            .take()
            .expect("command receiver taken before first start");
        let shared = self.shared.clone();
        let connect_timeout = self.connect_timeout;
        tokio::spawn(run_worker(shared, receiver, connect_timeout));
    }

    /// Request termination. Idempotent; safe before `start`.
    pub fn stop(&self) {
        self.shared.cancel.cancel();
        if !self.started.load(Ordering::SeqCst) {
            self.shared.terminate(TransportState::New);
        }
    }

    /// Issue a request and await the matching response.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> TransportResult<Value> {
        let reply = self.enqueue_call(method, params)?;
        self.await_reply(reply).await
    }

    /// Like [`call`](Self::call), but installs `handler` for every later
    /// notification keyed by `(method, params[0])` before the request is
    /// written. The subscribe reply resolves the returned future, not the
    /// handler.
    pub async fn subscribe(
        &self,
        method: &str,
        params: Vec<Value>,
        handler: NotificationHandler,
    ) -> TransportResult<Value> {
        let reply = self.enqueue_subscribe(method, params, handler)?;
        self.await_reply(reply).await
    }

    /// Remove one subscription entry. Notifications for the key are dropped
    /// from then on.
    pub fn unsubscribe(&self, method: &str, key: &str) {
        let _ = self.command_tx.send(Command::Unsubscribe {
            method: method.to_string(),
            key: key.to_string(),
        });
    }

    /// Enqueue a request; returns the reply future without awaiting it.
    /// Send order equals enqueue order, which keeps multi-request
    /// operations sequential on the wire.
    pub(crate) fn enqueue_call(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> TransportResult<oneshot::Receiver<TransportResult<Value>>> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Call {
                method: method.to_string(),
                params,
                reply: tx,
            })
            .map_err(|_| TransportError::Disconnected)?;
        Ok(rx)
    }

    pub(crate) fn enqueue_subscribe(
        &self,
        method: &str,
        params: Vec<Value>,
        handler: NotificationHandler,
    ) -> TransportResult<oneshot::Receiver<TransportResult<Value>>> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Subscribe {
                method: method.to_string(),
                params,
                handler,
                reply: tx,
            })
            .map_err(|_| TransportError::Disconnected)?;
        Ok(rx)
    }

    /// Await a reply future under the configured per-call deadline. A
    /// timeout fails only this call; the run is unaffected and the stale
    /// pending entry is reaped when its reply arrives or the run ends.
    pub(crate) async fn await_reply(
        &self,
        reply: oneshot::Receiver<TransportResult<Value>>,
    ) -> TransportResult<Value> {
        match self.call_timeout {
            Some(deadline) => match tokio::time::timeout(deadline, reply).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(TransportError::Disconnected),
                Err(_) => Err(TransportError::Timeout),
            },
            None => reply.await.unwrap_or(Err(TransportError::Disconnected)),
        }
    }
}

async fn run_worker(
    shared: Arc<Shared>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    connect_timeout: Duration,
) {
    shared.set_state(TransportState::Starting);

    let connect = TcpStream::connect((shared.server.host().to_string(), shared.server.port()));
    let stream = tokio::select! {
        _ = shared.cancel.cancelled() => {
            fail_queued(&mut commands);
            shared.terminate(TransportState::Starting);
            return;
        }
        result = tokio::time::timeout(connect_timeout, connect) => match result {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                tracing::warn!(server = %shared.server, error = %e, "connection failed");
                fail_queued(&mut commands);
                shared.terminate(TransportState::Starting);
                return;
            }
            Err(_) => {
                tracing::warn!(server = %shared.server, "connection attempt timed out");
                fail_queued(&mut commands);
                shared.terminate(TransportState::Starting);
                return;
            }
        }
    };

    tracing::info!(server = %shared.server, "transport connected");
    shared.set_state(TransportState::Running);
    shared.notify(TransportEvent::Running);

    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let mut pending: HashMap<u64, ReplySender> = HashMap::new();
    let mut subscriptions = SubscriptionRegistry::new();
    let mut next_id: u64 = 0;

    let from = loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => {
                shared.set_state(TransportState::Stopping);
                break TransportState::Stopping;
            }
            command = commands.recv() => {
                let Some(command) = command else {
                    // Every handle dropped; nothing can use this run anymore.
                    break TransportState::Running;
                };
                if handle_command(command, &mut next_id, &mut pending, &mut subscriptions, &mut write_half)
                    .await
                    .is_err()
                {
                    tracing::warn!(server = %shared.server, "socket write failed, ending run");
                    break TransportState::Running;
                }
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_line(&line, &mut pending, &subscriptions),
                Ok(None) => {
                    tracing::info!(server = %shared.server, "server closed connection");
                    break TransportState::Running;
                }
                Err(e) => {
                    tracing::warn!(server = %shared.server, error = %e, "socket read failed, ending run");
                    break TransportState::Running;
                }
            }
        }
    };

    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(TransportError::Disconnected));
    }
    fail_queued(&mut commands);
    drop(subscriptions);

    tracing::info!(server = %shared.server, "transport terminated");
    shared.terminate(from);
}

async fn handle_command(
    command: Command,
    next_id: &mut u64,
    pending: &mut HashMap<u64, ReplySender>,
    subscriptions: &mut SubscriptionRegistry,
    writer: &mut OwnedWriteHalf,
) -> std::io::Result<()> {
    match command {
        Command::Call {
            method,
            params,
            reply,
        } => write_request(&method, params, reply, next_id, pending, writer).await,
        Command::Subscribe {
            method,
            params,
            handler,
            reply,
        } => {
            // Install before the request is on the wire so no notification
            // can arrive unrouted.
            let key = params.first().and_then(Value::as_str).unwrap_or_default().to_string();
            subscriptions.insert(&method, key, handler);
            write_request(&method, params, reply, next_id, pending, writer).await
        }
        Command::Unsubscribe {
            method,
            key,
        } => {
            if !subscriptions.remove(&method, &key) {
                tracing::debug!(%method, %key, "unsubscribe for unknown subscription");
            }
            Ok(())
        }
    }
}

async fn write_request(
    method: &str,
    params: Vec<Value>,
    reply: ReplySender,
    next_id: &mut u64,
    pending: &mut HashMap<u64, ReplySender>,
    writer: &mut OwnedWriteHalf,
) -> std::io::Result<()> {
    let id = *next_id;
    *next_id += 1;
    let frame = RawRequest::new(id, method, params).to_frame();
    tracing::debug!(id, %method, "sending request");
    pending.insert(id, reply);
    if let Err(e) = writer.write_all(frame.as_bytes()).await {
        if let Some(reply) = pending.remove(&id) {
            let _ = reply.send(Err(TransportError::Disconnected));
        }
        return Err(e);
    }
    Ok(())
}

fn handle_line(line: &str, pending: &mut HashMap<u64, ReplySender>, subscriptions: &SubscriptionRegistry) {
    if line.trim().is_empty() {
        return;
    }
    match parse_incoming(line) {
        Ok(Incoming::Response(response)) => match pending.remove(&response.id) {
            Some(reply) => {
                let result = response.result.map_err(TransportError::Rpc);
                if reply.send(result).is_err() {
                    tracing::debug!(id = response.id, "reply receiver gone, dropping late response");
                }
            }
            None => {
                tracing::warn!(id = response.id, "response matches no pending call, dropping");
            }
        },
        Ok(Incoming::Notification(notification)) => subscriptions.dispatch(notification),
        Err(e) => {
            tracing::warn!(error = %e, "dropping malformed frame");
        }
    }
}

fn fail_queued(commands: &mut mpsc::UnboundedReceiver<Command>) {
    commands.close();
    while let Ok(command) = commands.try_recv() {
        match command {
            Command::Call {
                reply, ..
            }
            | Command::Subscribe {
                reply, ..
            } => {
                let _ = reply.send(Err(TransportError::Disconnected));
            }
            Command::Unsubscribe {
                ..
            } => {}
        }
    }
}
