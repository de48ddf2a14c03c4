//! Activity window tracking for burst zones
//!
//! Each burst zone keeps an ordered record of recent sensor trigger times
//! (oldest first). Occupancy is inferred when the count of events inside the
//! trailing window reaches the configured threshold.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use occ_core::ZoneId;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::trace;

/// Per-zone ordered event timestamp records
pub struct ActivityWindowTracker {
    records: DashMap<ZoneId, VecDeque<DateTime<Utc>>>,
}

impl ActivityWindowTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Append an event timestamp to a zone's record
    ///
    /// Timestamps arrive in event order, so the record stays chronologically
    /// sorted and eviction is a prefix trim.
    pub fn record(&self, zone_id: ZoneId, at: DateTime<Utc>) {
        self.records.entry(zone_id).or_default().push_back(at);
        trace!(zone_id = %zone_id, "Recorded activity event");
    }

    /// Trim entries older than the window and return the retained count
    ///
    /// An entry expires strictly after `window` has elapsed: an event at t=0
    /// with a 60 s window still counts at t=60 and is gone at t=61.
    pub fn evict_and_count(&self, zone_id: ZoneId, window: Duration, now: DateTime<Utc>) -> usize {
        let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);

        let Some(mut record) = self.records.get_mut(&zone_id) else {
            return 0;
        };

        let before = record.len();
        while let Some(oldest) = record.front() {
            if now.signed_duration_since(*oldest) > window {
                record.pop_front();
            } else {
                break;
            }
        }

        if record.len() != before {
            trace!(
                zone_id = %zone_id,
                evicted = before - record.len(),
                retained = record.len(),
                "Evicted expired activity events"
            );
        }

        record.len()
    }

    /// Current record length without eviction
    pub fn len(&self, zone_id: ZoneId) -> usize {
        self.records.get(&zone_id).map(|r| r.len()).unwrap_or(0)
    }

    /// Whether a zone has no recorded events
    pub fn is_empty(&self, zone_id: ZoneId) -> bool {
        self.len(zone_id) == 0
    }

    /// Drop a zone's record entirely
    pub fn remove(&self, zone_id: ZoneId) {
        self.records.remove(&zone_id);
    }
}

impl Default for ActivityWindowTracker {
    fn default() -> Self {
        Self::new()
    }
}
