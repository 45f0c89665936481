//! Retry schedule for contended files
//!
//! Files that could not be reconciled in a round (lock held elsewhere, lost
//! race, transient failure) are queued and revisited after a delay. The
//! delay grows geometrically up to a cap, and the number of rounds can be
//! bounded.

use std::time::Duration;

use weedsync_core::config::RetryConfig;
use weedsync_core::domain::{RelativePath, RemoteEntry};

/// Delay schedule between conflict rounds
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry round
    pub interval: Duration,
    /// Multiplier applied per further round
    pub backoff_factor: f64,
    /// Upper bound on any single delay
    pub max_interval: Duration,
    /// Number of retry rounds allowed; 0 means unbounded
    pub max_rounds: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_secs),
            backoff_factor: config.backoff_factor,
            max_interval: Duration::from_secs(config.max_interval_secs),
            max_rounds: config.max_rounds,
        }
    }

    /// A fixed delay with no growth, as the legacy client used
    pub fn fixed(interval: Duration, max_rounds: u32) -> Self {
        Self {
            interval,
            backoff_factor: 1.0,
            max_interval: interval,
            max_rounds,
        }
    }

    /// Delay before retry round `round` (1-based)
    #[must_use]
    pub fn delay_for_round(&self, round: u32) -> Duration {
        let exponent = round.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff_factor.max(1.0).powi(exponent);
        let secs = self.interval.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_interval.as_secs_f64() {
            return self.max_interval.max(self.interval);
        }
        Duration::from_secs_f64(secs)
    }

    /// Whether retry round `round` (1-based) may run
    #[must_use]
    pub fn allows(&self, round: u32) -> bool {
        self.max_rounds == 0 || round <= self.max_rounds
    }
}

/// Files deferred to the next conflict round
#[derive(Debug, Default)]
pub struct RetryQueue {
    entries: Vec<(RelativePath, RemoteEntry)>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: RelativePath, entry: RemoteEntry) {
        self.entries.push((path, entry));
    }

    /// Drain the queue for the next round
    pub fn take(&mut self) -> Vec<(RelativePath, RemoteEntry)> {
        std::mem::take(&mut self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &RelativePath> {
        self.entries.iter().map(|(p, _)| p)
    }
}
