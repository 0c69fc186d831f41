//! Error types for the Electrum SPV client.

use std::io;

use thiserror::Error;

/// Main error type for the Electrum SPV client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Not connected to any server")]
    NotConnected,

    #[error("Broadcast txid mismatch: sent {expected}, server returned {actual}")]
    BroadcastMismatch {
        expected: String,
        actual: String,
    },

    #[error("Client is stopped")]
    Stopped,

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Transport-level errors. Only `Disconnected` and I/O failures end a
/// connection run; everything else is surfaced to the requesting call.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Server returned error: {0}")]
    Rpc(serde_json::Value),

    #[error("Connection run terminated while call was outstanding")]
    Disconnected,

    #[error("Call deadline elapsed")]
    Timeout,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Wire-level framing errors. The transport logs these and keeps reading.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
}

/// Errors decoding a well-framed reply or notification into domain values.
/// Never propagated to the connection lifecycle; the dependent listener
/// callback is simply not invoked.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Unexpected reply shape: {0}")]
    BadShape(String),

    #[error("Invalid address for coin {coin}: {address:?}")]
    AddressFormat {
        coin: String,
        address: String,
    },

    #[error("Invalid hex: {0}")]
    BadHex(#[from] hex::FromHexError),
}

/// Errors initializing the logging subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to initialize subscriber: {0}")]
    SubscriberInit(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Type alias for Result with ClientError.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Type alias for transport operation results.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Type alias for decode operation results.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Type alias for logging setup results.
pub type LoggingResult<T> = std::result::Result<T, LoggingError>;
