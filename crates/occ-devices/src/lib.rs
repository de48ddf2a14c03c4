//! Binary device registry for the occupancy engine
//!
//! The DeviceStore tracks every host device the engine can see: raw sensors,
//! zones (which are devices too, so zones can watch other zones) and their
//! on/off state plus a display text. Every write fires a typed event on the
//! bus, which is the subscription feed the engine runs on.

use dashmap::DashMap;
use occ_core::events::{DeviceAddedData, DeviceChangedData, DeviceRemovedData};
use occ_core::{Context, DeviceId, ZoneId};
use occ_event_bus::EventBus;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, trace};

/// Result type for device store operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Errors from device store operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("device not found: {0}")]
    NotFound(DeviceId),

    #[error("device already exists: {0}")]
    AlreadyExists(DeviceId),
}

/// A registered device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Host-assigned identifier
    pub id: DeviceId,

    /// Human-readable name
    pub name: String,

    /// Current binary state
    pub on_state: bool,

    /// Human-readable status text (e.g. a delay countdown)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// The device store tracks all known devices
///
/// Responsible for:
/// - Storing the current on/off state of every device
/// - Firing DEVICE_ADDED / DEVICE_CHANGED / DEVICE_REMOVED events on writes
/// - The occupancy write path for zone devices
pub struct DeviceStore {
    /// All devices keyed by id
    devices: DashMap<DeviceId, Device>,
    /// Event bus for firing change events
    event_bus: Arc<EventBus>,
}

impl DeviceStore {
    /// Create a new device store on the given event bus
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            devices: DashMap::new(),
            event_bus,
        }
    }

    /// Register a new device
    ///
    /// Fires a DEVICE_ADDED event.
    pub fn add(
        &self,
        id: DeviceId,
        name: impl Into<String>,
        on_state: bool,
    ) -> DeviceResult<Device> {
        if self.devices.contains_key(&id) {
            return Err(DeviceError::AlreadyExists(id));
        }

        let device = Device {
            id,
            name: name.into(),
            on_state,
            display: None,
        };
        debug!(device_id = %id, name = %device.name, on_state, "Adding device");
        self.devices.insert(id, device.clone());

        self.event_bus.fire_typed(
            DeviceAddedData {
                device_id: id,
                name: device.name.clone(),
                on_state,
            },
            Context::new(),
        );

        Ok(device)
    }

    /// Get a device by id
    pub fn get(&self, id: DeviceId) -> Option<Device> {
        self.devices.get(&id).map(|d| d.clone())
    }

    /// Get a device's on/off state, or None if the device is unknown
    pub fn on_state(&self, id: DeviceId) -> Option<bool> {
        self.devices.get(&id).map(|d| d.on_state)
    }

    /// Check whether a device exists
    pub fn contains(&self, id: DeviceId) -> bool {
        self.devices.contains_key(&id)
    }

    /// Set a device's on/off state
    ///
    /// Fires a DEVICE_CHANGED event on every write, even if the value did
    /// not change; consumers filter on `old_on != new_on`.
    #[instrument(skip(self, context), fields(device_id = %id))]
    pub fn set_on_state(&self, id: DeviceId, on: bool, context: Context) -> DeviceResult<()> {
        let old_on = {
            let mut device = self.devices.get_mut(&id).ok_or(DeviceError::NotFound(id))?;
            let old = device.on_state;
            device.on_state = on;
            old
        };

        debug!(old_on, new_on = on, "Device state written");
        self.event_bus.fire_typed(
            DeviceChangedData {
                device_id: id,
                old_on,
                new_on: on,
            },
            context,
        );

        Ok(())
    }

    /// Set a device's display text without touching its on/off state
    ///
    /// Fires a DEVICE_CHANGED event with `old_on == new_on`.
    pub fn set_display(
        &self,
        id: DeviceId,
        display: Option<String>,
        context: Context,
    ) -> DeviceResult<()> {
        let on_state = {
            let mut device = self.devices.get_mut(&id).ok_or(DeviceError::NotFound(id))?;
            device.display = display;
            device.on_state
        };

        trace!(device_id = %id, "Device display written");
        self.event_bus.fire_typed(
            DeviceChangedData {
                device_id: id,
                old_on: on_state,
                new_on: on_state,
            },
            context,
        );

        Ok(())
    }

    /// Write a zone's derived occupancy and status text
    ///
    /// This is the engine's commit path. Zones are ordinary devices, so the
    /// DEVICE_CHANGED event this fires is how other zones watching this zone
    /// get re-evaluated.
    #[instrument(skip(self, display, context), fields(zone_id = %zone_id))]
    pub fn update_occupancy(
        &self,
        zone_id: ZoneId,
        occupied: bool,
        display: Option<String>,
        context: Context,
    ) -> DeviceResult<()> {
        let old_on = {
            let mut device = self
                .devices
                .get_mut(&zone_id)
                .ok_or(DeviceError::NotFound(zone_id))?;
            let old = device.on_state;
            device.on_state = occupied;
            device.display = display;
            old
        };

        debug!(old_on, occupied, "Zone occupancy written");
        self.event_bus.fire_typed(
            DeviceChangedData {
                device_id: zone_id,
                old_on,
                new_on: occupied,
            },
            context,
        );

        Ok(())
    }

    /// Remove a device
    ///
    /// Fires a DEVICE_REMOVED event with the device's last known name.
    pub fn remove(&self, id: DeviceId, context: Context) -> Option<Device> {
        let removed = self.devices.remove(&id).map(|(_, d)| d);

        if let Some(ref device) = removed {
            debug!(device_id = %id, name = %device.name, "Removing device");
            self.event_bus.fire_typed(
                DeviceRemovedData {
                    device_id: id,
                    name: device.name.clone(),
                },
                context,
            );
        }

        removed
    }

    /// Get the total number of devices
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Get all devices
    pub fn all(&self) -> Vec<Device> {
        self.devices.iter().map(|d| d.value().clone()).collect()
    }
}

/// Thread-safe wrapper for DeviceStore
pub type SharedDeviceStore = Arc<DeviceStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use occ_core::events::DeviceChangedData;

    fn make_store() -> (DeviceStore, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new());
        (DeviceStore::new(bus.clone()), bus)
    }

    #[tokio::test]
    async fn test_add_and_get() {
        let (store, _bus) = make_store();
        let id = DeviceId::new(1);

        store.add(id, "hall motion", false).unwrap();
        let device = store.get(id).unwrap();
        assert_eq!(device.name, "hall motion");
        assert!(!device.on_state);
        assert_eq!(store.on_state(id), Some(false));
    }

    #[tokio::test]
    async fn test_add_duplicate_fails() {
        let (store, _bus) = make_store();
        let id = DeviceId::new(1);

        store.add(id, "a", false).unwrap();
        assert_eq!(
            store.add(id, "b", false).unwrap_err(),
            DeviceError::AlreadyExists(id)
        );
    }

    #[tokio::test]
    async fn test_set_on_state_fires_event() {
        let (store, bus) = make_store();
        let id = DeviceId::new(7);
        store.add(id, "door", false).unwrap();

        let mut rx = bus.subscribe_typed::<DeviceChangedData>();
        store.set_on_state(id, true, Context::new()).unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.data.device_id, id);
        assert!(!event.data.old_on);
        assert!(event.data.new_on);
    }

    #[tokio::test]
    async fn test_set_on_state_unknown_device() {
        let (store, _bus) = make_store();
        assert_eq!(
            store
                .set_on_state(DeviceId::new(99), true, Context::new())
                .unwrap_err(),
            DeviceError::NotFound(DeviceId::new(99))
        );
    }

    #[tokio::test]
    async fn test_update_occupancy_writes_display() {
        let (store, bus) = make_store();
        let zone = DeviceId::new(100);
        store.add(zone, "kitchen zone", false).unwrap();

        let mut rx = bus.subscribe_typed::<DeviceChangedData>();
        store
            .update_occupancy(zone, true, Some("Delay 4.2".to_string()), Context::new())
            .unwrap();

        let device = store.get(zone).unwrap();
        assert!(device.on_state);
        assert_eq!(device.display.as_deref(), Some("Delay 4.2"));

        let event = rx.recv().await.unwrap();
        assert!(event.data.new_on);
    }

    #[tokio::test]
    async fn test_display_only_write_keeps_state() {
        let (store, bus) = make_store();
        let id = DeviceId::new(3);
        store.add(id, "zone", true).unwrap();

        let mut rx = bus.subscribe_typed::<DeviceChangedData>();
        store
            .set_display(id, Some("Delay 2.0".to_string()), Context::new())
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.data.old_on, event.data.new_on);
        assert!(store.get(id).unwrap().on_state);
    }

    #[tokio::test]
    async fn test_remove_fires_event() {
        let (store, bus) = make_store();
        let id = DeviceId::new(5);
        store.add(id, "stale sensor", false).unwrap();

        let mut rx = bus.subscribe_typed::<occ_core::events::DeviceRemovedData>();
        let removed = store.remove(id, Context::new()).unwrap();
        assert_eq!(removed.name, "stale sensor");
        assert!(store.get(id).is_none());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.data.device_id, id);
        assert_eq!(event.data.name, "stale sensor");
    }

    #[tokio::test]
    async fn test_remove_unknown_is_none() {
        let (store, _bus) = make_store();
        assert!(store.remove(DeviceId::new(404), Context::new()).is_none());
    }
}
