//! Light-wallet client core for Electrum-style backends.
//!
//! This library maintains a durable, self-healing connection to one of
//! several interchangeable servers speaking newline-delimited JSON-RPC
//! over TCP, multiplexes wallet queries and subscriptions over that
//! connection, and delivers blockchain events to registered listeners:
//!
//! - Supervised reconnection with per-run server blacklisting and
//!   exponential backoff (1 s doubling to a 16 s ceiling)
//! - Request/response correlation by id and routing of server-initiated
//!   notifications to persistent subscription handlers
//! - Address status subscriptions, unspent-output and history queries,
//!   raw transaction fetch, and broadcast with txid verification
//! - Listener fan-out where every registration carries its own sequenced
//!   executor
//!
//! Addresses, transaction hashes, and raw transaction bytes are opaque
//! here; wallets mint and interpret them.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use electrum_spv::{
//!     Address, BlockchainConnection, ClientConfig, CoinType, ConnectionEventListener,
//!     ElectrumClient, ServerAddress, TransactionEventListener,
//! };
//!
//! struct WalletListener;
//! impl ConnectionEventListener for WalletListener {
//!     fn on_connection(&self, server: ServerAddress) {
//!         println!("connected to {server}");
//!     }
//! }
//! impl TransactionEventListener for WalletListener {}
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let coin = CoinType::new("bitcoin", "BTC");
//!     let config = ClientConfig::new(
//!         coin.clone(),
//!         vec![
//!             "electrum1.example.org:50001".parse()?,
//!             "electrum2.example.org:50001".parse()?,
//!         ],
//!     );
//!
//!     let client = ElectrumClient::new(config).await?;
//!     let listener = Arc::new(WalletListener);
//!     client.add_event_listener(listener.clone());
//!     client.start()?;
//!
//!     let address = Address::from_repr(&coin, "1BoatSLRHtKNngkdXEeobR76b53LETtpyT")?;
//!     client.subscribe_to_addresses(&[address], listener).await?;
//!
//!     // ... run until shutdown, then:
//!     client.stop();
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod executor;
pub mod logging;
pub mod network;
pub mod types;

// Re-export main types for convenience
pub use client::{
    BlockchainConnection, ClientConfig, ConnectionEventListener, ElectrumClient,
    ListenerRegistration, TransactionEventListener,
};
pub use error::{ClientError, DecodeError, LoggingError, TransportError, WireError};
pub use executor::EventExecutor;
pub use logging::{init_console_logging, init_logging, LogFileConfig, LoggingConfig, LoggingGuard};
pub use network::{SupervisorState, TransportState};
pub use tracing::level_filters::LevelFilter;
pub use types::{
    Address, AddressStatus, CoinType, HistoryTx, ServerAddress, Transaction, TxId, UnspentTx,
};

/// Current version of the electrum-spv library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
