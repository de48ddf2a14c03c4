//! Per-zone timer scheduling
//!
//! Each zone owns at most one `Delay` timer and one `ForceOff` timer. Timers
//! live in explicit slots keyed by `(zone, kind)`: scheduling into an
//! occupied slot is the re-arm (the replaced timer can never fire), and
//! cancellation is slot removal. Firing is tick-driven — the engine drains
//! `due(now)` at the end of every evaluation pass.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use occ_core::{TimerKind, ZoneId};
use std::time::Duration;
use tracing::{debug, warn};

/// One outstanding scheduled evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTimer {
    pub zone_id: ZoneId,
    pub kind: TimerKind,
    /// Absolute fire time
    pub deadline: DateTime<Utc>,
    /// Candidate occupancy captured at schedule time (`Delay` timers only)
    pub candidate: Option<bool>,
}

/// Tracks and fires the per-zone timer slots
pub struct TimerScheduler {
    timers: DashMap<(ZoneId, TimerKind), PendingTimer>,
}

impl TimerScheduler {
    /// Create a scheduler with no outstanding timers
    pub fn new() -> Self {
        Self {
            timers: DashMap::new(),
        }
    }

    /// Schedule a timer, replacing any outstanding timer in the same slot
    pub fn schedule(
        &self,
        zone_id: ZoneId,
        kind: TimerKind,
        delay: Duration,
        candidate: Option<bool>,
        now: DateTime<Utc>,
    ) {
        let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
        let timer = PendingTimer {
            zone_id,
            kind,
            deadline: now + delay,
            candidate,
        };

        let replaced = self.timers.insert((zone_id, kind), timer);
        debug!(
            zone_id = %zone_id,
            ?kind,
            ?candidate,
            rearmed = replaced.is_some(),
            "Scheduled timer"
        );
    }

    /// Cancel one timer slot
    ///
    /// A missing timer is a recoverable no-op: it is warn-logged and `None`
    /// is returned, never an error.
    pub fn cancel(&self, zone_id: ZoneId, kind: TimerKind) -> Option<PendingTimer> {
        match self.timers.remove(&(zone_id, kind)) {
            Some((_, timer)) => {
                debug!(zone_id = %zone_id, ?kind, "Cancelled timer");
                Some(timer)
            }
            None => {
                warn!(zone_id = %zone_id, ?kind, "No outstanding timer to cancel");
                None
            }
        }
    }

    /// Cancel both slots for a zone, returning how many were outstanding
    pub fn cancel_zone(&self, zone_id: ZoneId) -> usize {
        [TimerKind::Delay, TimerKind::ForceOff]
            .into_iter()
            .filter(|&kind| self.timers.remove(&(zone_id, kind)).is_some())
            .count()
    }

    /// Remove and return every timer whose deadline has passed
    ///
    /// Ordered by deadline (ties broken by zone id, `Delay` before
    /// `ForceOff`) so firing is deterministic.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<PendingTimer> {
        let due_keys: Vec<(ZoneId, TimerKind)> = self
            .timers
            .iter()
            .filter(|entry| entry.deadline <= now)
            .map(|entry| *entry.key())
            .collect();

        let mut fired: Vec<PendingTimer> = due_keys
            .into_iter()
            .filter_map(|key| self.timers.remove(&key).map(|(_, t)| t))
            .collect();

        fired.sort_by_key(|t| (t.deadline, t.zone_id, t.kind != TimerKind::Delay));
        fired
    }

    /// The outstanding timer in a slot, if any
    pub fn pending(&self, zone_id: ZoneId, kind: TimerKind) -> Option<PendingTimer> {
        self.timers.get(&(zone_id, kind)).map(|t| t.clone())
    }

    /// Time remaining until a slot's deadline (zero if already due)
    pub fn remaining(&self, zone_id: ZoneId, kind: TimerKind, now: DateTime<Utc>) -> Option<Duration> {
        self.timers
            .get(&(zone_id, kind))
            .map(|t| t.deadline.signed_duration_since(now).to_std().unwrap_or(Duration::ZERO))
    }

    /// Total outstanding timers
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Whether no timers are outstanding
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl Default for TimerScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Countdown readout written to a zone's display while a delay timer runs
pub fn format_countdown(remaining: Duration) -> String {
    format!("Delay {:.1}", remaining.as_secs_f64())
}
