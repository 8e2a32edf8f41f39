//! Delta computation for cumulative server counters.
//!
//! Servers report monotonically growing totals (operation counters, flush
//! count). The dashboard shows how much each total moved since the previous
//! tick. Prior values are held in [`RateState`], owned by the console loop and
//! keyed by server name, so concurrent sampling never shares counters.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::collector::ServerStatus;

/// Per-server memory of one cumulative counter.
#[derive(Debug, Default)]
pub struct SnapshotCounter {
    prev: HashMap<String, u64>,
}

impl SnapshotCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `cumulative` for `server` and returns how much it grew.
    ///
    /// The first call for a server returns the full value. A value lower than
    /// the stored one (remote restart or counter reset) yields zero and
    /// becomes the new baseline.
    ///
    /// Must be called at most once per server per tick.
    pub fn delta(&mut self, server: &str, cumulative: u64) -> u64 {
        let prev = self.prev.insert(server.to_string(), cumulative).unwrap_or(0);
        if cumulative < prev {
            debug!(server, prev, cumulative, "counter went backwards, rebasing");
            return 0;
        }
        cumulative - prev
    }
}

/// Per-tick deltas derived from one status snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusDeltas {
    /// Operations of all kinds since the previous tick.
    pub operations: u64,
    /// Background flushes since the previous tick.
    pub flushes: u64,
    /// Time since the previous snapshot of the same server; `None` on the
    /// first one.
    pub elapsed: Option<Duration>,
}

impl StatusDeltas {
    /// Operations per second over the measured elapsed time.
    ///
    /// Without a previous snapshot (or with no measurable time between the
    /// two) the raw delta is returned.
    pub fn operations_per_second(&self) -> u64 {
        match self.elapsed {
            Some(elapsed) if !elapsed.is_zero() => {
                (self.operations as f64 / elapsed.as_secs_f64()).round() as u64
            }
            _ => self.operations,
        }
    }
}

/// Rate tracking state for every monitored server.
#[derive(Debug, Default)]
pub struct RateState {
    pub operations: SnapshotCounter,
    pub flushes: SnapshotCounter,
    sampled_at: HashMap<String, Instant>,
}

impl RateState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances both counters of `server` with a snapshot taken at `now`.
    pub fn update(&mut self, server: &str, status: &ServerStatus, now: Instant) -> StatusDeltas {
        let elapsed = self
            .sampled_at
            .insert(server.to_string(), now)
            .map(|prev| now.saturating_duration_since(prev));
        StatusDeltas {
            operations: self.operations.delta(server, status.total_operations()),
            flushes: self.flushes.delta(server, status.flush_count),
            elapsed,
        }
    }
}
