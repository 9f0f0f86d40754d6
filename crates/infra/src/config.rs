//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use stockledger_inventory::StalePolicy;

use crate::retry::RetryPolicy;

/// Tunables for the movement engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bounded wait for all locks of one transaction.
    pub lock_timeout_ms: u64,
    pub retry: RetryPolicy,
    pub adjustment_policy: StalePolicy,
    /// Capacity of the committed-entry broadcast; slow subscribers lag, writers never block.
    pub feed_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 2_000,
            retry: RetryPolicy::default(),
            adjustment_policy: StalePolicy::Recompute,
            feed_capacity: 256,
        }
    }
}

impl EngineConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms.max(1))
    }
}
