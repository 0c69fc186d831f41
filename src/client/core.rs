//! The client facade: domain operations over the supervised connection.
//!
//! Each operation issues RPCs against the current connection run and
//! adapts replies into domain events for the per-call listener. Reply
//! handling is spawned so callers never wait on the round trip; decode
//! failures are logged and the dependent callback is simply not invoked.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::watch;

use crate::client::config::ClientConfig;
use crate::client::interface::BlockchainConnection;
use crate::client::listeners::{ConnectionEventListener, ConnectionListeners, TransactionEventListener};
use crate::error::{ClientError, DecodeError, DecodeResult, Result};
use crate::executor::EventExecutor;
use crate::network::subscriptions::NotificationHandler;
use crate::network::supervisor::{ConnectionSupervisor, SupervisorState};
use crate::network::transport::ElectrumTransport;
use crate::network::wire::RawNotification;
use crate::types::{Address, AddressStatus, CoinType, HistoryTx, Transaction, TxId, UnspentTx};

const METHOD_ADDRESS_SUBSCRIBE: &str = "blockchain.address.subscribe";
const METHOD_LIST_UNSPENT: &str = "blockchain.address.listunspent";
const METHOD_GET_HISTORY: &str = "blockchain.address.get_history";
const METHOD_GET_TRANSACTION: &str = "blockchain.transaction.get";
const METHOD_BROADCAST: &str = "blockchain.transaction.broadcast";
const METHOD_SERVER_VERSION: &str = "server.version";

/// Light-wallet client for one coin against a set of interchangeable
/// Electrum-style servers. Construction wires the supervisor but does not
/// connect; call [`start`](Self::start) to begin the first run.
pub struct ElectrumClient {
    config: ClientConfig,
    supervisor: Arc<ConnectionSupervisor>,
    connection_listeners: Arc<ConnectionListeners>,
    user_executor: EventExecutor,
}

impl ElectrumClient {
    pub async fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let connection_listeners = Arc::new(ConnectionListeners::default());
        let supervisor =
            Arc::new(ConnectionSupervisor::new(config.clone(), connection_listeners.clone()));
        Ok(Self {
            config,
            supervisor,
            connection_listeners,
            user_executor: EventExecutor::new("user-events"),
        })
    }

    pub fn coin(&self) -> &CoinType {
        &self.config.coin
    }

    /// Begin supervision: select a server and connect. Rejected once the
    /// client has been stopped.
    pub fn start(&self) -> Result<()> {
        self.supervisor.start()
    }

    /// Stop the client: drops any pending reconnect, ends the current run
    /// (failing its outstanding calls), and prevents further starts.
    /// Idempotent from any state, so it is safe to wire into a process
    /// shutdown path.
    pub fn stop(&self) {
        self.supervisor.stop();
    }

    pub async fn is_connected(&self) -> bool {
        self.supervisor.connected_transport().await.is_some()
    }

    pub fn state(&self) -> SupervisorState {
        self.supervisor.state()
    }

    /// Observe supervisor state transitions.
    pub fn watch_state(&self) -> watch::Receiver<SupervisorState> {
        self.supervisor.watch_state()
    }

    /// Register a connection-event listener on the client's default
    /// executor.
    pub fn add_event_listener(&self, listener: Arc<dyn ConnectionEventListener>) {
        self.add_event_listener_with_executor(listener, self.user_executor.clone());
    }

    /// Register a connection-event listener on a caller-chosen executor.
    pub fn add_event_listener_with_executor(
        &self,
        listener: Arc<dyn ConnectionEventListener>,
        executor: EventExecutor,
    ) {
        self.connection_listeners.add(listener, executor);
    }

    /// Remove a listener. Returns true if it was registered.
    pub fn remove_event_listener(&self, listener: &Arc<dyn ConnectionEventListener>) -> bool {
        self.connection_listeners.remove(listener)
    }

    /// Drop the subscription for one address on the current run. Later
    /// notifications for it are discarded by the transport.
    pub async fn unsubscribe_from_address(&self, address: &Address) -> Result<()> {
        let transport = self.transport().await?;
        transport.unsubscribe(METHOD_ADDRESS_SUBSCRIBE, &address.to_string());
        Ok(())
    }

    async fn transport(&self) -> Result<Arc<ElectrumTransport>> {
        self.supervisor.connected_transport().await.ok_or(ClientError::NotConnected)
    }

    fn dispatch_status(
        executor: &EventExecutor,
        listener: &Arc<dyn TransactionEventListener>,
        status: AddressStatus,
    ) {
        let listener = listener.clone();
        executor.execute(Box::new(move || listener.on_address_status_update(status)));
    }
}

/// Holds back notification statuses until the subscribe reply has been
/// dispatched, so the listener always sees the reply first even though
/// reply decoding runs off the transport worker.
struct StatusGate {
    state: std::sync::Mutex<GateState>,
}

enum GateState {
    Buffering(Vec<AddressStatus>),
    Open,
}

impl StatusGate {
    fn new() -> Self {
        Self {
            state: std::sync::Mutex::new(GateState::Buffering(Vec::new())),
        }
    }

    fn on_notification(
        &self,
        status: AddressStatus,
        executor: &EventExecutor,
        listener: &Arc<dyn TransactionEventListener>,
    ) {
        let mut state = self.state.lock().expect("status gate lock");
        match &mut *state {
            GateState::Buffering(buffered) => buffered.push(status),
            GateState::Open => ElectrumClient::dispatch_status(executor, listener, status),
        }
    }

    /// Dispatch the reply status (if the reply produced one) followed by
    /// anything buffered, then pass notifications straight through.
    fn open(
        &self,
        reply_status: Option<AddressStatus>,
        executor: &EventExecutor,
        listener: &Arc<dyn TransactionEventListener>,
    ) {
        let mut state = self.state.lock().expect("status gate lock");
        if let Some(status) = reply_status {
            ElectrumClient::dispatch_status(executor, listener, status);
        }
        if let GateState::Buffering(buffered) = std::mem::replace(&mut *state, GateState::Open) {
            for status in buffered {
                ElectrumClient::dispatch_status(executor, listener, status);
            }
        }
    }
}

#[async_trait]
impl BlockchainConnection for ElectrumClient {
    async fn subscribe_to_addresses(
        &self,
        addresses: &[Address],
        listener: Arc<dyn TransactionEventListener>,
    ) -> Result<()> {
        let transport = self.transport().await?;

        for address in addresses {
            tracing::info!(%address, "subscribing to address");
            let gate = Arc::new(StatusGate::new());

            // Bind the address by value into this subscription's context.
            let handler: NotificationHandler = {
                let coin = self.config.coin.clone();
                let listener = listener.clone();
                let executor = self.user_executor.clone();
                let gate = gate.clone();
                Box::new(move |notification: RawNotification| {
                    match decode_status_notification(&coin, &notification) {
                        Ok(status) => gate.on_notification(status, &executor, &listener),
                        Err(e) => {
                            tracing::error!(error = %e, "dropping address status notification")
                        }
                    }
                })
            };

            let reply = transport
                .enqueue_subscribe(
                    METHOD_ADDRESS_SUBSCRIBE,
                    vec![json!(address.to_string())],
                    handler,
                )
                .map_err(ClientError::from)?;

            let transport = transport.clone();
            let address = address.clone();
            let listener = listener.clone();
            let executor = self.user_executor.clone();
            tokio::spawn(async move {
                let reply_status = match transport.await_reply(reply).await {
                    Ok(value) => match decode_status_reply(address, &value) {
                        Ok(status) => Some(status),
                        Err(e) => {
                            tracing::error!(error = %e, "unexpected address.subscribe reply shape");
                            None
                        }
                    },
                    Err(e) => {
                        tracing::error!(error = %e, "could not get reply for address subscribe");
                        None
                    }
                };
                gate.open(reply_status, &executor, &listener);
            });
        }
        Ok(())
    }

    async fn get_unspent(
        &self,
        status: AddressStatus,
        listener: Arc<dyn TransactionEventListener>,
    ) -> Result<()> {
        let transport = self.transport().await?;
        let reply = transport
            .enqueue_call(METHOD_LIST_UNSPENT, vec![json!(status.address().to_string())])
            .map_err(ClientError::from)?;

        let executor = self.user_executor.clone();
        tokio::spawn(async move {
            match transport.await_reply(reply).await {
                Ok(value) => match serde_json::from_value::<Vec<UnspentTx>>(value) {
                    Ok(unspent) => {
                        executor.execute(Box::new(move || {
                            listener.on_unspent_transaction_update(status, unspent)
                        }));
                    }
                    Err(e) => tracing::error!(error = %e, "unexpected listunspent reply shape"),
                },
                Err(e) => {
                    tracing::error!(error = %e, "could not get reply for blockchain.address.listunspent")
                }
            }
        });
        Ok(())
    }

    async fn get_history(
        &self,
        status: AddressStatus,
        listener: Arc<dyn TransactionEventListener>,
    ) -> Result<()> {
        let transport = self.transport().await?;
        let reply = transport
            .enqueue_call(METHOD_GET_HISTORY, vec![json!(status.address().to_string())])
            .map_err(ClientError::from)?;

        let executor = self.user_executor.clone();
        tokio::spawn(async move {
            match transport.await_reply(reply).await {
                Ok(value) => match serde_json::from_value::<Vec<HistoryTx>>(value) {
                    Ok(history) => {
                        executor.execute(Box::new(move || {
                            listener.on_transaction_history(status, history)
                        }));
                    }
                    Err(e) => tracing::error!(error = %e, "unexpected get_history reply shape"),
                },
                Err(e) => {
                    tracing::error!(error = %e, "could not get reply for blockchain.address.get_history")
                }
            }
        });
        Ok(())
    }

    async fn get_transaction(
        &self,
        txid: TxId,
        listener: Arc<dyn TransactionEventListener>,
    ) -> Result<()> {
        let transport = self.transport().await?;
        let reply = transport
            .enqueue_call(METHOD_GET_TRANSACTION, vec![json!(txid.to_string())])
            .map_err(ClientError::from)?;

        let executor = self.user_executor.clone();
        tokio::spawn(async move {
            match transport.await_reply(reply).await {
                Ok(value) => match decode_raw_transaction(&value) {
                    Ok(transaction) => {
                        executor
                            .execute(Box::new(move || listener.on_transaction_update(transaction)));
                    }
                    Err(e) => tracing::error!(error = %e, "unexpected transaction.get reply shape"),
                },
                Err(e) => {
                    tracing::error!(error = %e, "could not get reply for blockchain.transaction.get")
                }
            }
        });
        Ok(())
    }

    async fn broadcast_transaction(
        &self,
        transaction: Transaction,
        listener: Option<Arc<dyn TransactionEventListener>>,
    ) -> Result<()> {
        let transport = self.transport().await?;
        let reply = transport
            .enqueue_call(METHOD_BROADCAST, vec![json!(transaction.to_hex())])
            .map_err(ClientError::from)?;

        let executor = self.user_executor.clone();
        tokio::spawn(async move {
            let expected = transaction.txid().to_string();
            let failure = match transport.await_reply(reply).await {
                Ok(value) => match result_first_string(&value) {
                    Ok(actual) => {
                        tracing::info!(%actual, %expected, "broadcast acknowledged");
                        if actual == expected {
                            None
                        } else {
                            Some(ClientError::BroadcastMismatch {
                                expected,
                                actual,
                            })
                        }
                    }
                    Err(e) => Some(ClientError::Decode(e)),
                },
                Err(e) => Some(ClientError::Transport(e)),
            };

            match failure {
                None => {
                    if let Some(listener) = listener {
                        executor
                            .execute(Box::new(move || listener.on_transaction_broadcast(transaction)));
                    }
                }
                Some(error) => {
                    tracing::error!(error = %error, "transaction broadcast failed");
                    if let Some(listener) = listener {
                        executor.execute(Box::new(move || {
                            listener.on_transaction_broadcast_error(transaction, error)
                        }));
                    }
                }
            }
        });
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let Some(transport) = self.supervisor.connected_transport().await else {
            tracing::warn!(coin = %self.config.coin.name(), "no connection, skipping ping");
            return Err(ClientError::NotConnected);
        };
        let reply =
            transport.enqueue_call(METHOD_SERVER_VERSION, vec![]).map_err(ClientError::from)?;

        let coin = self.config.coin.name().to_string();
        tokio::spawn(async move {
            match transport.await_reply(reply).await {
                Ok(value) => match result_first_string(&value) {
                    Ok(version) => tracing::info!(%coin, %version, "server version OK"),
                    Err(e) => tracing::debug!(error = %e, "unexpected server.version reply shape"),
                },
                Err(e) => tracing::error!(%coin, error = %e, "server ping failed"),
            }
        });
        Ok(())
    }
}

/// First string element of a reply that is either a bare string or an
/// array whose element 0 is a string.
fn result_first_string(value: &Value) -> DecodeResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Array(items) => match items.first() {
            Some(Value::String(s)) => Ok(s.clone()),
            _ => Err(DecodeError::BadShape(format!("expected string at element 0: {value}"))),
        },
        other => Err(DecodeError::BadShape(format!("expected string result: {other}"))),
    }
}

/// Status value of an `address.subscribe` reply: a string, null for
/// no-history, or either of those wrapped in a one-element array.
fn decode_status_reply(address: Address, value: &Value) -> DecodeResult<AddressStatus> {
    let status = match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => match items.first() {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                return Err(DecodeError::BadShape(format!("unexpected status value: {other}")))
            }
        },
        other => return Err(DecodeError::BadShape(format!("unexpected status value: {other}"))),
    };
    Ok(AddressStatus::new(address, status))
}

/// Decode a status notification: params `[address, status]`.
fn decode_status_notification(coin: &CoinType, notification: &RawNotification) -> DecodeResult<AddressStatus> {
    let repr = notification
        .key_param()
        .ok_or_else(|| DecodeError::BadShape("notification without address param".to_string()))?;
    let address = Address::from_repr(coin, repr)?;
    let status = match notification.params.get(1) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            return Err(DecodeError::BadShape(format!("unexpected status value: {other}")))
        }
    };
    Ok(AddressStatus::new(address, status))
}

/// Raw transaction hex from a `transaction.get` reply.
fn decode_raw_transaction(value: &Value) -> DecodeResult<Transaction> {
    Transaction::from_hex(&result_first_string(value)?)
}
