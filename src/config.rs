// Powerlog - Meter acquisition pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Configuration types for Powerlog

use crate::layout::READ_REGISTERS;
use std::time::Duration;

/// Default poll period
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default energy rate limit in kWh (or kvarh) per second.
///
/// 0.1/s is 360 kWh per hour, well above any single-phase installation, so
/// only corrupted frames hit it.
pub const DEFAULT_ENERGY_RATE_LIMIT: f64 = 0.1;

/// Default value of the `device_name` label
pub const DEFAULT_DEVICE_NAME: &str = "mains";

/// Poller configuration for one device
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Value of the `device_name` label on every gauge
    pub device_name: String,

    /// Number of holding registers read per cycle, starting at address 0
    pub register_count: u16,

    /// Period between two poll cycles
    pub poll_interval: Duration,

    /// Maximum credible increase per second of the energy counters
    pub energy_rate_limit: f64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            register_count: READ_REGISTERS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            energy_rate_limit: DEFAULT_ENERGY_RATE_LIMIT,
        }
    }
}

impl PollerConfig {
    /// Create a configuration for a named device
    pub fn with_device_name(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            ..Default::default()
        }
    }

    /// Create a configuration with a custom poll period
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..Default::default()
        }
    }

    /// Expected frame length in bytes
    pub fn frame_len(&self) -> usize {
        usize::from(self.register_count) * 2
    }
}
