//! Target Health Tracking
//!
//! Time-based bookkeeping for the relay loop: what the last connectivity
//! probe said, when to trust it, and when periodic work is due. All times
//! are milliseconds on a monotonic clock supplied by the caller.

/// A reachability flip worth narrating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthChange {
    /// Target answered after being unreachable or unknown
    Connected,
    /// Target stopped answering after being reachable or unknown
    Disconnected,
}

/// Last known reachability of the target
#[derive(Debug, Clone)]
pub struct TargetHealth {
    reachable: Option<bool>,
    last_probe_ms: Option<u64>,
    recheck_interval_ms: u64,
}

impl TargetHealth {
    /// Create a tracker that has not probed yet
    pub fn new(recheck_interval_ms: u64) -> Self {
        Self {
            reachable: None,
            last_probe_ms: None,
            recheck_interval_ms,
        }
    }

    /// Record a probe result, returning the flip it caused, if any
    pub fn record_probe(&mut self, reachable: bool, now_ms: u64) -> Option<HealthChange> {
        let previous = self.reachable.replace(reachable);
        self.last_probe_ms = Some(now_ms);

        match (previous, reachable) {
            (Some(true), true) | (Some(false), false) => None,
            (_, true) => Some(HealthChange::Connected),
            (_, false) => Some(HealthChange::Disconnected),
        }
    }

    /// Whether the last probe succeeded. Unknown counts as not reachable.
    pub fn is_reachable(&self) -> bool {
        self.reachable == Some(true)
    }

    /// Last probe failed and the re-check interval has not elapsed yet
    pub fn is_known_unreachable(&self, now_ms: u64) -> bool {
        match (self.reachable, self.last_probe_ms) {
            (Some(false), Some(at)) => now_ms.saturating_sub(at) < self.recheck_interval_ms,
            _ => false,
        }
    }

    /// Target is marked unreachable and it is time to probe again
    pub fn recheck_due(&self, now_ms: u64) -> bool {
        match (self.reachable, self.last_probe_ms) {
            (Some(false), Some(at)) => now_ms.saturating_sub(at) >= self.recheck_interval_ms,
            _ => false,
        }
    }

    /// Milliseconds until the next re-check, zero when due or not applicable
    pub fn recheck_in_ms(&self, now_ms: u64) -> u64 {
        match (self.reachable, self.last_probe_ms) {
            (Some(false), Some(at)) => {
                (at + self.recheck_interval_ms).saturating_sub(now_ms)
            }
            _ => 0,
        }
    }
}

/// Fixed-interval schedule for periodic work inside a cooperative loop
#[derive(Debug, Clone)]
pub struct Cadence {
    interval_ms: u64,
    last_ms: Option<u64>,
}

impl Cadence {
    /// Create a cadence that is due immediately
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_ms: None,
        }
    }

    /// Check whether the work is due at `now_ms`
    pub fn is_due(&self, now_ms: u64) -> bool {
        match self.last_ms {
            None => true,
            Some(at) => now_ms.saturating_sub(at) >= self.interval_ms,
        }
    }

    /// Record that the work ran at `now_ms`
    pub fn mark(&mut self, now_ms: u64) {
        self.last_ms = Some(now_ms);
    }

    /// Mark and report in one step; true when the work should run now
    pub fn tick(&mut self, now_ms: u64) -> bool {
        if self.is_due(now_ms) {
            self.mark(now_ms);
            true
        } else {
            false
        }
    }
}
