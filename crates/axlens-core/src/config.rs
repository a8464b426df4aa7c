//! Inspector Configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Inspector tuning knobs.
///
/// Every field falls back to the hardcoded default when the host supplies no
/// configuration, or a partial one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectorConfig {
    /// How long a cached snapshot stays fresh (ms).
    pub ttl_ms: u64,

    /// Quiet period before a coalesced refetch fires (ms).
    pub debounce_ms: u64,

    /// Attempts before a module init failure becomes permanent.
    pub max_retries: u32,

    /// Base delay between init retries; scales linearly with the attempt (ms).
    pub retry_base_delay_ms: u64,

    /// Heartbeat gap above which the host is assumed to have slept (ms).
    pub wake_gap_threshold_ms: u64,

    /// Shadow-root active-element sampling interval (ms).
    pub shadow_poll_interval_ms: u64,

    /// Quiet period after the last viewport change before refreshing (ms).
    pub resize_settle_ms: u64,

    /// Module readiness polling interval (ms).
    pub registry_poll_interval_ms: u64,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 10_000,
            debounce_ms: 150,
            max_retries: 10,
            retry_base_delay_ms: 50,
            wake_gap_threshold_ms: 5_000,
            shadow_poll_interval_ms: 250,
            resize_settle_ms: 300,
            registry_poll_interval_ms: 50,
        }
    }
}

impl InspectorConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn wake_gap_threshold(&self) -> Duration {
        Duration::from_millis(self.wake_gap_threshold_ms)
    }

    pub fn shadow_poll_interval(&self) -> Duration {
        Duration::from_millis(self.shadow_poll_interval_ms)
    }

    pub fn resize_settle(&self) -> Duration {
        Duration::from_millis(self.resize_settle_ms)
    }

    pub fn registry_poll_interval(&self) -> Duration {
        Duration::from_millis(self.registry_poll_interval_ms)
    }
}
