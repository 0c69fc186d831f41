//! Network tunables.

use std::time::Duration;

// Timeouts
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// Reconnection. The delay doubles on every consecutive failure and is
// clamped to the ceiling, giving the 1-2-4-8-16 second ladder.
pub const RETRY_DELAY_FLOOR: Duration = Duration::from_secs(1);
pub const RETRY_DELAY_CEILING: Duration = Duration::from_secs(16);
