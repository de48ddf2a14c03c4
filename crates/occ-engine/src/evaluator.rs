//! Raw occupancy evaluation for threshold zones
//!
//! Pure verdict computation: no timers, no commits. The evaluator maps each
//! member sensor's on-state through the zone's polarity and folds the
//! readings with the aggregation mode.

use occ_core::{AggregationMode, DeviceId, SensorPolarity, ThresholdZone};
use tracing::warn;

/// Compute the raw occupied/unoccupied candidate for a threshold zone
///
/// `on_state` resolves a member sensor to its current on/off state, or None
/// when the device no longer exists. Missing sensors are excluded from the
/// aggregation; a zone with no resolvable sensors reads unoccupied.
pub fn evaluate_threshold(
    zone: &ThresholdZone,
    mut on_state: impl FnMut(DeviceId) -> Option<bool>,
) -> bool {
    let mut readings = Vec::with_capacity(zone.sensors.len());

    for &sensor in &zone.sensors {
        match on_state(sensor) {
            Some(state) => readings.push(match zone.polarity {
                SensorPolarity::On => state,
                SensorPolarity::Off => !state,
                // a state change is itself the evidence; the force-off
                // timer is what ends occupancy
                SensorPolarity::Change => true,
            }),
            None => {
                warn!(sensor = %sensor, "watched sensor missing, excluded from aggregation");
            }
        }
    }

    if readings.is_empty() {
        return false;
    }

    match zone.aggregation {
        AggregationMode::All => readings.iter().all(|&on| on),
        AggregationMode::Any => readings.iter().any(|&on| on),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn zone(
        sensors: &[u64],
        aggregation: AggregationMode,
        polarity: SensorPolarity,
    ) -> ThresholdZone {
        ThresholdZone {
            sensors: sensors.iter().map(|&id| DeviceId::new(id)).collect(),
            aggregation,
            polarity,
            on_delay: Duration::ZERO,
            off_delay: Duration::ZERO,
            force_off_delay: None,
        }
    }

    fn states(pairs: &[(u64, bool)]) -> HashMap<DeviceId, bool> {
        pairs.iter().map(|&(id, on)| (DeviceId::new(id), on)).collect()
    }

    #[test]
    fn test_on_all() {
        let zone = zone(&[1, 2], AggregationMode::All, SensorPolarity::On);

        let lookup = states(&[(1, true), (2, true)]);
        assert!(evaluate_threshold(&zone, |id| lookup.get(&id).copied()));

        let lookup = states(&[(1, true), (2, false)]);
        assert!(!evaluate_threshold(&zone, |id| lookup.get(&id).copied()));
    }

    #[test]
    fn test_on_any() {
        let zone = zone(&[1, 2], AggregationMode::Any, SensorPolarity::On);

        let lookup = states(&[(1, false), (2, true)]);
        assert!(evaluate_threshold(&zone, |id| lookup.get(&id).copied()));

        let lookup = states(&[(1, false), (2, false)]);
        assert!(!evaluate_threshold(&zone, |id| lookup.get(&id).copied()));
    }

    #[test]
    fn test_off_polarity_inverts() {
        let zone = zone(&[1, 2], AggregationMode::All, SensorPolarity::Off);

        let lookup = states(&[(1, false), (2, false)]);
        assert!(evaluate_threshold(&zone, |id| lookup.get(&id).copied()));

        let lookup = states(&[(1, true), (2, false)]);
        assert!(!evaluate_threshold(&zone, |id| lookup.get(&id).copied()));
    }

    #[test]
    fn test_change_polarity_always_occupied() {
        let zone = zone(&[1, 2], AggregationMode::All, SensorPolarity::Change);

        let lookup = states(&[(1, false), (2, false)]);
        assert!(evaluate_threshold(&zone, |id| lookup.get(&id).copied()));
    }

    #[test]
    fn test_missing_sensor_excluded() {
        let zone = zone(&[1, 2], AggregationMode::All, SensorPolarity::On);

        // sensor 2 deleted: verdict computed over sensor 1 alone
        let lookup = states(&[(1, true)]);
        assert!(evaluate_threshold(&zone, |id| lookup.get(&id).copied()));
    }

    #[test]
    fn test_all_sensors_missing_reads_unoccupied() {
        let zone = zone(&[1, 2], AggregationMode::All, SensorPolarity::On);
        assert!(!evaluate_threshold(&zone, |_| None));

        let zone = self::zone(&[1], AggregationMode::Any, SensorPolarity::Change);
        assert!(!evaluate_threshold(&zone, |_| None));
    }
}
