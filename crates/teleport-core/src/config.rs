use std::time::Duration;

use alloy::primitives::U256;

use crate::watcher::WatchConfig;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_receipt_attempts: u32,
    pub receipt_backoff_unit: Duration,
    /// Relay failures tolerated before a further relay choice is refused.
    pub max_relay_attempts: u32,
    /// 1e18 = 100%.
    pub max_fee_percentage: U256,
    pub relay_expiry: Duration,
    /// Delay before re-arming a wait that ended with a transient error.
    pub retry_delay: Duration,
    pub event_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_receipt_attempts: 10,
            receipt_backoff_unit: Duration::from_secs(1),
            max_relay_attempts: 2,
            max_fee_percentage: U256::from(40_000_000_000_000_000u64),
            relay_expiry: Duration::from_secs(60 * 60),
            retry_delay: Duration::from_secs(2),
            event_capacity: 64,
        }
    }
}

impl OrchestratorConfig {
    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            max_attempts: self.max_receipt_attempts,
            backoff_unit: self.receipt_backoff_unit,
        }
    }
}
