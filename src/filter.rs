// Powerlog - Meter acquisition pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Noise filter for monotonic counters
//!
//! Energy totals read over a noisy serial line occasionally come back as
//! zero, smaller than before, or with a jump no real load could produce.
//! A [`CounterFilter`] sits in front of such a counter and only lets a
//! reading through when it is plausible.
//!
//! A reading above the last accepted value is plausible when the increase
//! fits in a budget of `rate_limit * elapsed`, where `elapsed` is the time
//! since the last accepted reading. A rejected reading leaves the baseline
//! untouched, so the budget keeps growing: a genuine step is accepted once
//! enough time has passed, a single corrupt spike is never seen again.

use std::time::Instant;

/// Outcome of a single observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// First reading, accepted unconditionally
    First,
    /// Increase within budget, new baseline
    Accepted,
    /// Same as the baseline, only the accept time moves
    Unchanged,
    /// Zero or negative reading
    RejectedNonPositive,
    /// Reading below the baseline
    RejectedDecrease,
    /// Increase larger than the accrued budget
    RejectedJump,
}

impl Decision {
    /// Check if the reading was let through
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::First | Self::Accepted | Self::Unchanged)
    }
}

#[derive(Debug, Clone, Copy)]
struct Baseline {
    value: f64,
    at: Instant,
}

/// Gate in front of a single monotonic counter
#[derive(Debug, Clone)]
pub struct CounterFilter {
    /// Maximum credible increase per second
    rate_limit: f64,
    last: Option<Baseline>,
}

impl CounterFilter {
    /// Create a filter allowing at most `rate_limit` units of increase per
    /// second of elapsed time.
    pub fn new(rate_limit: f64) -> Self {
        Self {
            rate_limit,
            last: None,
        }
    }

    /// Last accepted value, if any reading was accepted yet
    pub fn last_accepted(&self) -> Option<f64> {
        self.last.map(|b| b.value)
    }

    /// Run `candidate` through the filter and return the value to publish.
    pub fn filter(&mut self, candidate: f64, now: Instant) -> f64 {
        self.observe(candidate, now);
        self.last.map_or(candidate, |b| b.value)
    }

    /// Run `candidate` through the filter and report what happened to it.
    pub fn observe(&mut self, candidate: f64, now: Instant) -> Decision {
        let Some(last) = self.last else {
            self.last = Some(Baseline {
                value: candidate,
                at: now,
            });
            return Decision::First;
        };

        if candidate <= 0.0 {
            return Decision::RejectedNonPositive;
        }
        if candidate < last.value {
            return Decision::RejectedDecrease;
        }
        if candidate == last.value {
            self.last = Some(Baseline {
                value: last.value,
                at: now,
            });
            return Decision::Unchanged;
        }
        if candidate.is_nan() {
            return Decision::RejectedJump;
        }

        let delta = candidate - last.value;
        let elapsed = now.saturating_duration_since(last.at).as_secs_f64();
        if delta <= self.rate_limit * elapsed {
            self.last = Some(Baseline {
                value: candidate,
                at: now,
            });
            Decision::Accepted
        } else {
            Decision::RejectedJump
        }
    }
}
