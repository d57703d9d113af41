//! # Powerlog - Energy meter acquisition pipeline
//!
//! Polls a Modbus energy meter on a fixed period and publishes its readings
//! as Prometheus gauges.
//!
//! ## Key Features
//!
//! - **Register codec**: big-endian 16/32-bit registers to physical units
//! - **Failure policy**: instantaneous readings drop to zero on a failed
//!   poll, cumulative counters keep their last good value
//! - **Counter filter**: energy totals are protected from zero, decreasing
//!   and implausibly large readings caused by line noise
//! - **Cooperative shutdown**: stopping never aborts a read in flight
//!
//! ## Quick Start
//!
//! ```rust
//! use async_trait::async_trait;
//! use powerlog::{MetricSet, PollCycle, PollerConfig, RegisterSource, Scheduler};
//! use prometheus::Registry;
//!
//! struct Meter;
//!
//! #[async_trait]
//! impl RegisterSource for Meter {
//!     async fn read_holding_registers(&mut self, _address: u16, count: u16) -> std::io::Result<Vec<u8>> {
//!         Ok(vec![0; usize::from(count) * 2])
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> powerlog::Result<()> {
//! let registry = Registry::new();
//! let config = PollerConfig::with_device_name("mains");
//! let metrics = MetricSet::new(&registry, &config)?;
//!
//! let running = Scheduler::new(PollCycle::new(Meter, metrics), config.poll_interval)
//!     .start()
//!     .await;
//!
//! // Serve registry.gather() to scrapers...
//!
//! let cycle = running.stop().await?;
//! assert_eq!(cycle.metrics().errors(), 0.0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`codec`]: Register decoding
//! - [`filter`]: Noise filter for monotonic counters
//! - [`layout`]: Register map of the meter
//! - [`metric_set`]: Gauges and failure policy
//! - [`poller`]: One acquisition cycle and the register source seam
//! - [`scheduler`]: Periodic polling and shutdown

// Modules
pub mod codec;
pub mod config;
pub mod error;
pub mod filter;
pub mod layout;
pub mod metric_set;
pub mod poller;
pub mod scheduler;

// Re-exports for convenient access
pub use codec::{decode16, decode32, Width};
pub use config::{PollerConfig, DEFAULT_ENERGY_RATE_LIMIT, DEFAULT_POLL_INTERVAL};
pub use error::{Error, PollError, Result};
pub use filter::{CounterFilter, Decision};
pub use layout::{MetricSpec, DEVICE_METRICS, FRAME_LEN, READ_REGISTERS};
pub use metric_set::{MetricDescriptor, MetricSet, DEVICE_LABEL};
pub use poller::{PollCycle, RegisterSource};
pub use scheduler::{RunningScheduler, Scheduler};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
