//! Core types for the occupancy engine
//!
//! This crate provides the fundamental types used throughout the occupancy
//! workspace: DeviceId, Context, Event, and the zone configuration model.

mod context;
mod device_id;
mod event;
mod zone;

pub use context::Context;
pub use device_id::{DeviceId, DeviceIdError, TriggerId, ZoneId};
pub use event::{Event, EventData, EventType};
pub use zone::{
    AggregationMode, BurstZone, SensorPolarity, ThresholdZone, TimerKind, TriggerConfig,
    TriggerPolarity, ZoneConfig, ZoneKind,
};

/// Standard event types fired on the occupancy event bus
pub mod events {
    use super::*;

    /// Event type for device on/off state or display updates
    pub const DEVICE_CHANGED: &str = "device_changed";

    /// Event type for a device appearing in the registry
    pub const DEVICE_ADDED: &str = "device_added";

    /// Event type for a device leaving the registry
    pub const DEVICE_REMOVED: &str = "device_removed";

    /// Event type for a committed zone occupancy flip
    pub const OCCUPANCY_CHANGED: &str = "occupancy_changed";

    /// Event type for a matched trigger subscription
    pub const TRIGGER_FIRED: &str = "trigger_fired";

    /// Data for DEVICE_CHANGED events
    ///
    /// Fired on every write, including display-only updates; consumers that
    /// only care about on/off transitions filter on `old_on != new_on`.
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct DeviceChangedData {
        pub device_id: DeviceId,
        pub old_on: bool,
        pub new_on: bool,
    }

    impl EventData for DeviceChangedData {
        fn event_type() -> &'static str {
            DEVICE_CHANGED
        }
    }

    /// Data for DEVICE_ADDED events
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct DeviceAddedData {
        pub device_id: DeviceId,
        pub name: String,
        pub on_state: bool,
    }

    impl EventData for DeviceAddedData {
        fn event_type() -> &'static str {
            DEVICE_ADDED
        }
    }

    /// Data for DEVICE_REMOVED events
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct DeviceRemovedData {
        pub device_id: DeviceId,
        pub name: String,
    }

    impl EventData for DeviceRemovedData {
        fn event_type() -> &'static str {
            DEVICE_REMOVED
        }
    }

    /// Data for OCCUPANCY_CHANGED events
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct OccupancyChangedData {
        pub zone_id: ZoneId,
        pub occupied: bool,
    }

    impl EventData for OccupancyChangedData {
        fn event_type() -> &'static str {
            OCCUPANCY_CHANGED
        }
    }

    /// Data for TRIGGER_FIRED events
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct TriggerFiredData {
        pub trigger_id: TriggerId,
        pub zone_id: ZoneId,
        pub occupied: bool,
    }

    impl EventData for TriggerFiredData {
        fn event_type() -> &'static str {
            TRIGGER_FIRED
        }
    }
}
