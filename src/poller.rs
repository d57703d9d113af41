// Powerlog - Meter acquisition pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Poll cycle
//!
//! One acquisition: read the register span from a [`RegisterSource`],
//! validate the frame and publish it through the [`MetricSet`]. Any failure
//! is recorded in the metric set and returned; it never poisons the next
//! cycle.

use crate::error::PollError;
use crate::metric_set::MetricSet;
use async_trait::async_trait;
use std::io;
use tokio::time::Instant;

/// Request/response access to a device's holding registers
#[async_trait]
pub trait RegisterSource: Send {
    /// Read `count` registers starting at `address`.
    ///
    /// Returns the big-endian byte image of the registers, two bytes per
    /// register.
    async fn read_holding_registers(&mut self, address: u16, count: u16) -> io::Result<Vec<u8>>;
}

/// One device: a register source and the gauges it feeds
#[derive(Debug)]
pub struct PollCycle<S> {
    source: S,
    metrics: MetricSet,
    register_count: u16,
}

impl<S: RegisterSource> PollCycle<S> {
    /// Create a poll cycle reading the span decoded by `metrics`.
    pub fn new(source: S, metrics: MetricSet) -> Self {
        let register_count = metrics.register_count();
        Self {
            source,
            metrics,
            register_count,
        }
    }

    /// Run one acquisition.
    pub async fn update(&mut self) -> Result<(), PollError> {
        let frame = match self
            .source
            .read_holding_registers(0, self.register_count)
            .await
        {
            Ok(frame) => frame,
            Err(e) => {
                self.metrics.on_failure();
                return Err(PollError::Transport(e));
            }
        };

        let expected = self.metrics.frame_len();
        if frame.len() != expected {
            self.metrics.on_failure();
            return Err(PollError::FrameLength {
                expected,
                actual: frame.len(),
            });
        }

        // Readings are stamped on the runtime clock the scheduler ticks on
        self.metrics.apply(&frame, Instant::now().into_std());
        Ok(())
    }

    /// Gauges fed by this cycle
    pub fn metrics(&self) -> &MetricSet {
        &self.metrics
    }

    /// Register source of this cycle
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Number of registers requested per cycle
    pub fn register_count(&self) -> u16 {
        self.register_count
    }
}
