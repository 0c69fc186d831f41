//! Configuration for the Electrum SPV client.

use std::time::Duration;

use crate::error::ClientError;
use crate::network::constants::{DEFAULT_CONNECT_TIMEOUT, RETRY_DELAY_CEILING, RETRY_DELAY_FLOOR};
use crate::types::{CoinType, ServerAddress};

/// Configuration for one client instance: the target coin, the fixed set
/// of interchangeable backend servers, and connection tunables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Chain the servers speak for.
    pub coin: CoinType,

    /// Backend servers. Fixed at construction; order is irrelevant.
    pub servers: Vec<ServerAddress>,

    /// TCP connect deadline per attempt.
    pub connect_timeout: Duration,

    /// Optional per-call deadline. `None` means calls wait until the run
    /// ends.
    pub call_timeout: Option<Duration>,

    /// Reconnect delay after the first failure; also the value restored on
    /// a successful connection.
    pub retry_delay_floor: Duration,

    /// Ceiling for the doubling reconnect delay.
    pub retry_delay_ceiling: Duration,
}

impl ClientConfig {
    pub fn new(coin: CoinType, servers: Vec<ServerAddress>) -> Self {
        Self {
            coin,
            servers,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            call_timeout: None,
            retry_delay_floor: RETRY_DELAY_FLOOR,
            retry_delay_ceiling: RETRY_DELAY_CEILING,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Shrink or stretch the reconnect ladder. The doubling shape and the
    /// reset-on-connect behavior are fixed; only the endpoints move.
    pub fn with_retry_delays(mut self, floor: Duration, ceiling: Duration) -> Self {
        self.retry_delay_floor = floor;
        self.retry_delay_ceiling = ceiling;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        if self.servers.is_empty() {
            return Err(ClientError::Config("server list must not be empty".to_string()));
        }
        if self.retry_delay_floor.is_zero() {
            return Err(ClientError::Config("retry delay floor must be positive".to_string()));
        }
        if self.retry_delay_ceiling < self.retry_delay_floor {
            return Err(ClientError::Config(
                "retry delay ceiling must be at least the floor".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coin() -> CoinType {
        CoinType::new("bitcoin", "BTC")
    }

    #[test]
    fn defaults_follow_the_backoff_ladder() {
        let config = ClientConfig::new(coin(), vec![ServerAddress::new("a", 1)]);
        assert_eq!(config.retry_delay_floor, Duration::from_secs(1));
        assert_eq!(config.retry_delay_ceiling, Duration::from_secs(16));
        assert!(config.call_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_empty_server_list() {
        let config = ClientConfig::new(coin(), vec![]);
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));
    }

    #[test]
    fn rejects_inverted_retry_delays() {
        let config = ClientConfig::new(coin(), vec![ServerAddress::new("a", 1)])
            .with_retry_delays(Duration::from_secs(4), Duration::from_secs(2));
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));
    }
}
