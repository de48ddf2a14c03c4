//! Zone registry and sensor watch index
//!
//! Owns the set of active zones (configuration + committed occupancy) and
//! the reverse index from sensor device id to the zones watching it.

use dashmap::DashMap;
use indexmap::IndexSet;
use occ_config::ConfigError;
use occ_core::{DeviceId, ZoneConfig, ZoneId, ZoneKind};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};

/// Stored per-zone state
#[derive(Debug, Clone)]
pub struct ZoneState {
    /// Active configuration
    pub config: ZoneConfig,
    /// Last-committed occupancy (the externally observable state)
    pub occupied: bool,
}

/// Registry of active zones with their sensor watch index
pub struct ZoneRegistry {
    /// Active zones keyed by zone id
    zones: DashMap<ZoneId, ZoneState>,
    /// Reverse index: sensor id -> zones watching it (insertion-ordered)
    watch_index: DashMap<DeviceId, IndexSet<ZoneId>>,
}

impl ZoneRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            zones: DashMap::new(),
            watch_index: DashMap::new(),
        }
    }

    /// Register a zone and index its sensors
    ///
    /// Validates the structural invariants that depend on registry state:
    /// duplicate activation, empty sensor list, self-reference, and the
    /// transitive recursion check across threshold zones. Rejected
    /// configuration leaves the registry untouched. Initial occupancy is
    /// `false` until the caller's zero-event evaluation commits a verdict.
    pub fn insert(&self, zone_id: ZoneId, config: ZoneConfig) -> EngineResult<()> {
        if self.zones.contains_key(&zone_id) {
            return Err(EngineError::AlreadyActive(zone_id));
        }
        if config.sensors().is_empty() {
            return Err(ConfigError::single("sensors", "sensor list must not be empty").into());
        }
        if config.sensors().contains(&zone_id) {
            return Err(ConfigError::single("sensors", "zone cannot watch itself").into());
        }
        if self.creates_cycle(zone_id, &config) {
            return Err(ConfigError::single(
                "sensors",
                format!("recursive sensor reference involving zone {}", zone_id),
            )
            .into());
        }

        for &sensor in config.sensors() {
            self.watch_index.entry(sensor).or_default().insert(zone_id);
        }

        info!(zone_id = %zone_id, kind = %config.kind(), sensors = config.sensors().len(), "Zone activated");
        self.zones.insert(
            zone_id,
            ZoneState {
                config,
                occupied: false,
            },
        );
        Ok(())
    }

    /// Remove a zone and unindex its sensors
    pub fn remove(&self, zone_id: ZoneId) -> EngineResult<ZoneState> {
        let (_, state) = self
            .zones
            .remove(&zone_id)
            .ok_or(EngineError::ZoneNotFound(zone_id))?;

        for &sensor in state.config.sensors() {
            if let Some(mut watchers) = self.watch_index.get_mut(&sensor) {
                watchers.shift_remove(&zone_id);
            }
        }
        // prune emptied entries
        self.watch_index.retain(|_, watchers| !watchers.is_empty());

        info!(zone_id = %zone_id, "Zone deactivated");
        Ok(state)
    }

    /// Replace a zone's configuration in place
    ///
    /// Kind and sensor membership are fixed while a zone is active;
    /// changing them requires deactivate + activate. Timers and the watch
    /// index are untouched.
    pub fn update_config(&self, zone_id: ZoneId, new_config: ZoneConfig) -> EngineResult<()> {
        let mut state = self
            .zones
            .get_mut(&zone_id)
            .ok_or(EngineError::ZoneNotFound(zone_id))?;

        if state.config.kind() != new_config.kind() {
            return Err(
                ConfigError::single("kind", "zone kind cannot change while active").into(),
            );
        }

        let old_sensors: HashSet<DeviceId> = state.config.sensors().iter().copied().collect();
        let new_sensors: HashSet<DeviceId> = new_config.sensors().iter().copied().collect();
        if old_sensors != new_sensors {
            return Err(ConfigError::single(
                "sensors",
                "sensor membership cannot change while active",
            )
            .into());
        }

        debug!(zone_id = %zone_id, "Zone configuration updated");
        state.config = new_config;
        Ok(())
    }

    /// A zone's active configuration
    pub fn config(&self, zone_id: ZoneId) -> Option<ZoneConfig> {
        self.zones.get(&zone_id).map(|s| s.config.clone())
    }

    /// A zone's committed occupancy
    pub fn occupied(&self, zone_id: ZoneId) -> Option<bool> {
        self.zones.get(&zone_id).map(|s| s.occupied)
    }

    /// Write a zone's committed occupancy, returning the previous value
    pub fn set_occupied(&self, zone_id: ZoneId, occupied: bool) -> EngineResult<bool> {
        let mut state = self
            .zones
            .get_mut(&zone_id)
            .ok_or(EngineError::ZoneNotFound(zone_id))?;
        let old = state.occupied;
        state.occupied = occupied;
        Ok(old)
    }

    /// Whether a zone is active
    pub fn contains(&self, zone_id: ZoneId) -> bool {
        self.zones.contains_key(&zone_id)
    }

    /// Zones watching a device, in registration order
    pub fn watchers(&self, device_id: DeviceId) -> Vec<ZoneId> {
        self.watch_index
            .get(&device_id)
            .map(|w| w.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether any zone watches a device
    pub fn is_watched(&self, device_id: DeviceId) -> bool {
        self.watch_index
            .get(&device_id)
            .map(|w| !w.is_empty())
            .unwrap_or(false)
    }

    /// All active zone ids
    pub fn zone_ids(&self) -> Vec<ZoneId> {
        self.zones.iter().map(|entry| *entry.key()).collect()
    }

    /// Active zone count
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Whether no zones are active
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Number of devices with at least one watcher
    pub fn watched_device_count(&self) -> usize {
        self.watch_index.len()
    }

    /// Detect whether activating `zone_id` with `config` would close a
    /// dependency cycle
    ///
    /// DFS over threshold zones' sensor lists with a visited set. Only
    /// threshold zones participate in the walk; burst zones referencing
    /// each other are accepted.
    fn creates_cycle(&self, zone_id: ZoneId, config: &ZoneConfig) -> bool {
        if config.kind() != ZoneKind::Threshold {
            return false;
        }

        let mut visited: HashSet<DeviceId> = HashSet::new();
        let mut stack: Vec<DeviceId> = config.sensors().to_vec();

        while let Some(id) = stack.pop() {
            if id == zone_id {
                return true;
            }
            if !visited.insert(id) {
                continue;
            }
            if let Some(state) = self.zones.get(&id) {
                if state.config.kind() == ZoneKind::Threshold {
                    stack.extend_from_slice(state.config.sensors());
                }
            }
        }
        false
    }
}

impl Default for ZoneRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use occ_core::{AggregationMode, BurstZone, SensorPolarity, ThresholdZone};
    use std::time::Duration;

    fn threshold(sensors: &[u64]) -> ZoneConfig {
        ZoneConfig::Threshold(ThresholdZone {
            sensors: sensors.iter().map(|&id| DeviceId::new(id)).collect(),
            aggregation: AggregationMode::All,
            polarity: SensorPolarity::On,
            on_delay: Duration::ZERO,
            off_delay: Duration::ZERO,
            force_off_delay: None,
        })
    }

    fn burst(sensors: &[u64]) -> ZoneConfig {
        ZoneConfig::Burst(BurstZone {
            sensors: sensors.iter().map(|&id| DeviceId::new(id)).collect(),
            activity_window: Duration::from_secs(60),
            activity_count: 3,
        })
    }

    #[test]
    fn test_insert_indexes_sensors() {
        let registry = ZoneRegistry::new();
        let zone = ZoneId::new(100);

        registry.insert(zone, threshold(&[1, 2])).unwrap();

        assert_eq!(registry.watchers(DeviceId::new(1)), vec![zone]);
        assert_eq!(registry.watchers(DeviceId::new(2)), vec![zone]);
        assert_eq!(registry.occupied(zone), Some(false));
    }

    #[test]
    fn test_duplicate_activation_rejected() {
        let registry = ZoneRegistry::new();
        let zone = ZoneId::new(100);

        registry.insert(zone, threshold(&[1])).unwrap();
        assert_eq!(
            registry.insert(zone, threshold(&[1])).unwrap_err(),
            EngineError::AlreadyActive(zone)
        );
    }

    #[test]
    fn test_shared_sensor_ordering() {
        let registry = ZoneRegistry::new();

        registry.insert(ZoneId::new(100), threshold(&[1])).unwrap();
        registry.insert(ZoneId::new(200), threshold(&[1])).unwrap();

        assert_eq!(
            registry.watchers(DeviceId::new(1)),
            vec![ZoneId::new(100), ZoneId::new(200)]
        );
    }

    #[test]
    fn test_remove_leaves_no_residual_reference() {
        let registry = ZoneRegistry::new();
        let zone = ZoneId::new(100);

        registry.insert(zone, threshold(&[1, 2])).unwrap();
        registry.remove(zone).unwrap();

        assert!(!registry.is_watched(DeviceId::new(1)));
        assert!(!registry.is_watched(DeviceId::new(2)));
        assert_eq!(registry.watched_device_count(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_unknown_zone() {
        let registry = ZoneRegistry::new();
        assert_eq!(
            registry.remove(ZoneId::new(9)).unwrap_err(),
            EngineError::ZoneNotFound(ZoneId::new(9))
        );
    }

    #[test]
    fn test_mutual_reference_rejected() {
        let registry = ZoneRegistry::new();
        let zone_a = ZoneId::new(100);
        let zone_b = ZoneId::new(200);

        // A watches B before B exists: nothing to walk yet
        registry.insert(zone_a, threshold(&[200])).unwrap();

        // B watching A closes the cycle
        let err = registry.insert(zone_b, threshold(&[100])).unwrap_err();
        let EngineError::Config(config_err) = err else {
            panic!("expected config error, got {:?}", err);
        };
        assert!(config_err.errors()["sensors"].contains("recursive"));
        assert!(!registry.contains(zone_b));
        assert!(!registry.is_watched(ZoneId::new(100)));
    }

    #[test]
    fn test_deep_recursion_detected() {
        let registry = ZoneRegistry::new();

        registry.insert(ZoneId::new(100), threshold(&[200])).unwrap();
        registry.insert(ZoneId::new(200), threshold(&[300])).unwrap();

        // 300 -> 100 -> 200 -> 300
        let err = registry.insert(ZoneId::new(300), threshold(&[100])).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_burst_zones_not_cycle_checked() {
        let registry = ZoneRegistry::new();

        registry.insert(ZoneId::new(100), burst(&[200])).unwrap();
        // accepted: recursion walk only covers threshold zones
        registry.insert(ZoneId::new(200), burst(&[100])).unwrap();
    }

    #[test]
    fn test_update_keeps_membership() {
        let registry = ZoneRegistry::new();
        let zone = ZoneId::new(100);
        registry.insert(zone, threshold(&[1, 2])).unwrap();

        // same membership, new delays: accepted
        let mut updated = threshold(&[2, 1]);
        if let ZoneConfig::Threshold(z) = &mut updated {
            z.on_delay = Duration::from_secs(10);
        }
        registry.update_config(zone, updated).unwrap();

        let ZoneConfig::Threshold(z) = registry.config(zone).unwrap() else {
            panic!("expected threshold zone");
        };
        assert_eq!(z.on_delay, Duration::from_secs(10));

        // changed membership: rejected, config untouched
        let err = registry.update_config(zone, threshold(&[1, 3])).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        assert_eq!(registry.config(zone).unwrap().sensors().len(), 2);
    }

    #[test]
    fn test_update_cannot_change_kind() {
        let registry = ZoneRegistry::new();
        let zone = ZoneId::new(100);
        registry.insert(zone, threshold(&[1])).unwrap();

        let err = registry.update_config(zone, burst(&[1])).unwrap_err();
        let EngineError::Config(config_err) = err else {
            panic!("expected config error");
        };
        assert!(config_err.errors().contains_key("kind"));
    }

    #[test]
    fn test_set_occupied_returns_old() {
        let registry = ZoneRegistry::new();
        let zone = ZoneId::new(100);
        registry.insert(zone, threshold(&[1])).unwrap();

        assert!(!registry.set_occupied(zone, true).unwrap());
        assert!(registry.set_occupied(zone, true).unwrap());
        assert_eq!(registry.occupied(zone), Some(true));
    }
}
