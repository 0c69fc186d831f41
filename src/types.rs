//! Common type definitions for the Electrum SPV client.
//!
//! Addresses and raw transactions are opaque to this crate: wallets mint
//! them and interpret them. The only computation performed here is the
//! double-SHA256 transaction id used to verify broadcast acknowledgements.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::DecodeError;

/// Identifier of the target chain. The client only reads its name for
/// logging and tags addresses with it; external collaborators interpret
/// addresses and transaction bytes under it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoinType {
    name: String,
    symbol: String,
}

impl CoinType {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl fmt::Display for CoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Host and port of one backend server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    host: String,
    port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for ServerAddress {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| DecodeError::BadShape(format!("server address without port: {s:?}")))?;
        if host.is_empty() {
            return Err(DecodeError::BadShape(format!("server address without host: {s:?}")));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| DecodeError::BadShape(format!("bad port in {s:?}: {e}")))?;
        Ok(Self::new(host, port))
    }
}

/// An opaque printable address string plus the name of the coin it was
/// minted under. Equality is by string form under a fixed coin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    coin: String,
    repr: String,
}

impl Address {
    /// Bind an address string to a coin. Real format checks (base58,
    /// bech32, ...) belong to the wallet layer; this only rejects strings
    /// that cannot be an address under any encoding.
    pub fn from_repr(coin: &CoinType, repr: impl Into<String>) -> Result<Self, DecodeError> {
        let repr = repr.into();
        if repr.is_empty() || !repr.chars().all(|c| c.is_ascii_graphic()) {
            return Err(DecodeError::AddressFormat {
                coin: coin.name().to_string(),
                address: repr,
            });
        }
        Ok(Self {
            coin: coin.name().to_string(),
            repr,
        })
    }

    pub fn coin_name(&self) -> &str {
        &self.coin
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr)
    }
}

/// Pairing of an address with the server-computed fingerprint of its
/// history. `None` means the address has no history yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressStatus {
    address: Address,
    status: Option<String>,
}

impl AddressStatus {
    pub fn new(address: Address, status: Option<String>) -> Self {
        Self {
            address,
            status,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}

/// A 32-byte transaction hash in conventional display order.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxId([u8; 32]);

impl TxId {
    /// Compute the id of a serialized transaction: double SHA-256 of the
    /// raw bytes, byte-reversed into display order.
    pub fn of_raw_tx(raw: &[u8]) -> Self {
        let first = Sha256::digest(raw);
        let second = Sha256::digest(first);
        let mut bytes: [u8; 32] = second.into();
        bytes.reverse();
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", self)
    }
}

impl FromStr for TxId {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s)?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| DecodeError::BadShape(format!("txid is not 32 bytes: {s:?}")))?;
        Ok(Self(bytes))
    }
}

impl Serialize for TxId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TxId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One transaction touching an address, as reported by
/// `blockchain.address.get_history`. Height 0 means mempool; negative
/// means unconfirmed with unconfirmed parents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTx {
    pub tx_hash: TxId,
    pub height: i64,
}

/// One unspent output of an address, as reported by
/// `blockchain.address.listunspent`. Equality is by
/// `(tx_hash, tx_pos, value)`; height moves as blocks arrive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnspentTx {
    pub tx_hash: TxId,
    pub tx_pos: u32,
    pub value: u64,
    pub height: i64,
}

impl PartialEq for UnspentTx {
    fn eq(&self, other: &Self) -> bool {
        self.tx_hash == other.tx_hash && self.tx_pos == other.tx_pos && self.value == other.value
    }
}

impl Eq for UnspentTx {}

impl std::hash::Hash for UnspentTx {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.tx_hash.hash(state);
        self.tx_pos.hash(state);
        self.value.hash(state);
    }
}

/// A raw serialized transaction. The client never parses the contents;
/// it only hashes them for broadcast confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    raw: Vec<u8>,
}

impl Transaction {
    pub fn from_raw(raw: Vec<u8>) -> Self {
        Self {
            raw,
        }
    }

    pub fn from_hex(s: &str) -> Result<Self, DecodeError> {
        Ok(Self::from_raw(hex::decode(s)?))
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.raw)
    }

    pub fn txid(&self) -> TxId {
        TxId::of_raw_tx(&self.raw)
    }
}
