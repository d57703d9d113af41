// Powerlog - Meter acquisition pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for Powerlog
//!
//! Construction and lifecycle failures are [`Error`]; they are fatal for the
//! instance that produced them. Failures of a single poll are [`PollError`]
//! and never stop the scheduler.

use thiserror::Error;

/// Result type alias for construction and lifecycle operations
pub type Result<T> = std::result::Result<T, Error>;

/// Construction and lifecycle errors
#[derive(Error, Debug)]
pub enum Error {
    /// A gauge could not be registered (typically a duplicate name)
    #[error("Could not register gauge {name}: {source}")]
    Registration {
        name: String,
        #[source]
        source: prometheus::Error,
    },

    /// A metric descriptor does not fit the device frame
    #[error("Invalid descriptor for {name}: {reason}")]
    InvalidDescriptor { name: String, reason: String },

    /// The frame length is not a whole number of registers a single read
    /// can request
    #[error("Invalid frame length: {0} bytes")]
    InvalidFrameLength(usize),

    /// The background polling task panicked or was cancelled
    #[error("Polling task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

/// Errors of a single poll cycle
#[derive(Error, Debug)]
pub enum PollError {
    /// The register source failed to deliver a frame
    #[error("Could not read values: {0}")]
    Transport(#[from] std::io::Error),

    /// The frame does not cover the expected register span
    #[error("Invalid read size: expected {expected} bytes, got {actual}")]
    FrameLength { expected: usize, actual: usize },
}
