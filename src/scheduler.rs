// Powerlog - Meter acquisition pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Periodic polling with cooperative shutdown
//!
//! ```text
//! Scheduler ──start()──▶ RunningScheduler ──stop()──▶ PollCycle
//!   (idle)                   (running)        (stopping → stopped)
//! ```
//!
//! `start` runs one cycle right away, then hands the cycle to a background
//! task that polls on every tick. `stop` consumes the running handle, signals
//! the task and waits for any in-flight cycle to finish; it never aborts a
//! read. Dropping a [`RunningScheduler`] without calling `stop` also ends the
//! task after its current cycle, but nobody waits for it.

use crate::error::Result;
use crate::poller::{PollCycle, RegisterSource};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// Idle poller, owns the cycle until started
#[derive(Debug)]
pub struct Scheduler<S> {
    cycle: PollCycle<S>,
    period: Duration,
}

impl<S: RegisterSource + 'static> Scheduler<S> {
    /// Create an idle scheduler polling every `period`.
    pub fn new(cycle: PollCycle<S>, period: Duration) -> Self {
        Self { cycle, period }
    }

    /// Poll period
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run one cycle now, then keep polling on a background task.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(self) -> RunningScheduler<S> {
        let Self { mut cycle, period } = self;
        info!(
            "Starting poller: {} registers every {:?}",
            cycle.register_count(),
            period
        );

        run_cycle(&mut cycle).await;

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(poll_loop(cycle, period, stop_rx));
        RunningScheduler {
            stop: stop_tx,
            task,
        }
    }
}

/// Handle on a running poller
#[derive(Debug)]
pub struct RunningScheduler<S> {
    stop: oneshot::Sender<()>,
    task: JoinHandle<PollCycle<S>>,
}

impl<S: RegisterSource + 'static> RunningScheduler<S> {
    /// Stop scheduling new cycles and wait for the current one to finish.
    ///
    /// Returns the cycle so its final state can be inspected. Fails only if
    /// the polling task panicked.
    pub async fn stop(self) -> Result<PollCycle<S>> {
        info!("Stopping poller");
        if self.stop.send(()).is_err() {
            debug!("Polling task already exited");
        }
        let cycle = self.task.await?;
        info!("Poller stopped");
        Ok(cycle)
    }

    /// Check if the polling task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

async fn poll_loop<S: RegisterSource>(
    mut cycle: PollCycle<S>,
    period: Duration,
    mut stop: oneshot::Receiver<()>,
) -> PollCycle<S> {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            // Fires on an explicit stop and when the handle is dropped
            _ = &mut stop => break,
            _ = ticker.tick() => run_cycle(&mut cycle).await,
        }
    }

    cycle
}

async fn run_cycle<S: RegisterSource>(cycle: &mut PollCycle<S>) {
    match cycle.update().await {
        Ok(()) => debug!("Values updated"),
        Err(e) => error!("Could not update values: {}", e),
    }
}
