//! Bus construction configuration

use crate::error::{EventError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How matched handlers are grouped during delivery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeliveryMode {
    /// One handler at a time, in resolution order
    #[default]
    Individual,
    /// Grouped by the cluster each handler was matched through
    Batch,
}

/// Serializable bus options
///
/// Callbacks (error handler, action logger) are attached on the bus itself
/// since they cannot be deserialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusConfig {
    /// Emit action logs and report unhandled handler failures
    pub debug_mode: bool,

    /// Persistence used by publishes that don't specify it
    pub default_persist: bool,

    /// Delay hint for external schedulers, in milliseconds
    ///
    /// The bus itself never sleeps.
    pub wait_timeout_ms: u64,

    /// Handler delivery strategy
    pub delivery_mode: DeliveryMode,
}

impl BusConfig {
    /// Parse from a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| EventError::Config(format!("Invalid bus config: {}", e)))
    }

    pub fn with_debug_mode(mut self, debug_mode: bool) -> Self {
        self.debug_mode = debug_mode;
        self
    }

    pub fn with_default_persist(mut self, default_persist: bool) -> Self {
        self.default_persist = default_persist;
        self
    }

    /// Set the scheduler delay hint, rounded up to whole milliseconds
    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout_ms = millis_ceil(wait_timeout);
        self
    }

    pub fn with_delivery_mode(mut self, delivery_mode: DeliveryMode) -> Self {
        self.delivery_mode = delivery_mode;
        self
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

/// Whole milliseconds in `duration`, rounding any remainder up and
/// saturating at `u64::MAX`
pub(crate) fn millis_ceil(duration: Duration) -> u64 {
    let mut millis = duration.as_millis();
    if duration.subsec_nanos() % 1_000_000 != 0 {
        millis += 1;
    }
    u64::try_from(millis).unwrap_or(u64::MAX)
}
