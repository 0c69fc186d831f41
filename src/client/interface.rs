//! Abstraction over a blockchain connection.
//!
//! Wallet-layer consumers depend on this trait instead of the concrete
//! client so tests can substitute their own implementation.

use std::sync::Arc;

use async_trait::async_trait;

use crate::client::listeners::TransactionEventListener;
use crate::error::Result;
use crate::types::{Address, AddressStatus, Transaction, TxId};

/// Domain operations against the connected backend. All results are
/// delivered through the per-call listener; the methods themselves only
/// fail when no connection run is current.
#[async_trait]
pub trait BlockchainConnection: Send + Sync {
    /// Subscribe to status changes of each address. The subscribe reply
    /// and every later notification both arrive via
    /// `on_address_status_update`.
    async fn subscribe_to_addresses(
        &self,
        addresses: &[Address],
        listener: Arc<dyn TransactionEventListener>,
    ) -> Result<()>;

    /// Fetch the unspent outputs of the status's address.
    async fn get_unspent(
        &self,
        status: AddressStatus,
        listener: Arc<dyn TransactionEventListener>,
    ) -> Result<()>;

    /// Fetch the transaction history of the status's address.
    async fn get_history(
        &self,
        status: AddressStatus,
        listener: Arc<dyn TransactionEventListener>,
    ) -> Result<()>;

    /// Fetch a raw transaction by id.
    async fn get_transaction(
        &self,
        txid: TxId,
        listener: Arc<dyn TransactionEventListener>,
    ) -> Result<()>;

    /// Broadcast a raw transaction. The acknowledgement txid must equal
    /// the transaction's own hash for `on_transaction_broadcast` to fire;
    /// any failure goes to `on_transaction_broadcast_error`.
    async fn broadcast_transaction(
        &self,
        transaction: Transaction,
        listener: Option<Arc<dyn TransactionEventListener>>,
    ) -> Result<()>;

    /// Liveness check; the reply is logged only.
    async fn ping(&self) -> Result<()>;
}
