//! Zone configuration model
//!
//! A zone is a configured aggregation unit over one or more binary sensors.
//! Two kinds exist: threshold zones (classic all/any debounce logic) and
//! burst zones (occupancy inferred from event density in a trailing window).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{DeviceId, ZoneId};

/// How member sensor verdicts are folded into the zone verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    /// Occupied when every member sensor reads occupied
    All,
    /// Occupied when any member sensor reads occupied
    Any,
}

/// How a member sensor's on-state maps to an occupancy reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorPolarity {
    /// Sensor reads occupied while on
    On,
    /// Sensor reads occupied while off
    Off,
    /// Any state change reads as occupied; only the force-off timer ends it
    Change,
}

/// Which committed value a trigger subscription fires on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPolarity {
    Occupied,
    Unoccupied,
}

/// The two per-zone timer slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// Debounce-delay timer carrying a captured candidate verdict
    Delay,
    /// Safety timeout that unconditionally clears occupancy
    ForceOff,
}

/// Zone kind discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    Threshold,
    Burst,
}

impl std::fmt::Display for ZoneKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZoneKind::Threshold => write!(f, "threshold"),
            ZoneKind::Burst => write!(f, "burst"),
        }
    }
}

/// Configuration for a threshold (delay + force-off debounce) zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdZone {
    /// Member sensor device ids (non-empty)
    pub sensors: Vec<DeviceId>,

    /// all/any fold over member sensors
    pub aggregation: AggregationMode,

    /// on/off/change reading of each member sensor
    pub polarity: SensorPolarity,

    /// Delay before an occupied candidate is committed
    #[serde(with = "duration_secs")]
    pub on_delay: Duration,

    /// Delay before an unoccupied candidate is committed
    #[serde(with = "duration_secs")]
    pub off_delay: Duration,

    /// Safety timeout; required (and > 0) when polarity is `Change`
    #[serde(default, with = "option_duration_secs")]
    pub force_off_delay: Option<Duration>,
}

/// Configuration for a burst (activity window) zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BurstZone {
    /// Member sensor device ids (non-empty)
    pub sensors: Vec<DeviceId>,

    /// Trailing window events are counted within
    #[serde(with = "duration_secs")]
    pub activity_window: Duration,

    /// Event count within the window that means occupied
    pub activity_count: usize,
}

/// Zone configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ZoneConfig {
    /// Classic all/any debounce zone
    Threshold(ThresholdZone),

    /// Activity-window zone
    Burst(BurstZone),
}

impl ZoneConfig {
    /// Member sensor list of either kind
    pub fn sensors(&self) -> &[DeviceId] {
        match self {
            ZoneConfig::Threshold(z) => &z.sensors,
            ZoneConfig::Burst(z) => &z.sensors,
        }
    }

    /// Zone kind discriminant
    pub fn kind(&self) -> ZoneKind {
        match self {
            ZoneConfig::Threshold(_) => ZoneKind::Threshold,
            ZoneConfig::Burst(_) => ZoneKind::Burst,
        }
    }
}

/// A trigger subscription bound to a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Zone whose committed occupancy is watched
    pub zone_id: ZoneId,

    /// Committed value the trigger fires on
    pub polarity: TriggerPolarity,
}

// --- Duration serde helpers (seconds, fractional allowed) ---

pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom("duration must be >= 0 seconds"));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}

pub(crate) mod option_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<f64> = Option::deserialize(deserializer)?;
        match opt {
            None => Ok(None),
            Some(secs) if secs.is_finite() && secs >= 0.0 => {
                Ok(Some(Duration::from_secs_f64(secs)))
            }
            Some(_) => Err(serde::de::Error::custom("duration must be >= 0 seconds")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_threshold() -> ZoneConfig {
        ZoneConfig::Threshold(ThresholdZone {
            sensors: vec![DeviceId::new(1), DeviceId::new(2)],
            aggregation: AggregationMode::All,
            polarity: SensorPolarity::On,
            on_delay: Duration::from_secs(5),
            off_delay: Duration::from_secs(30),
            force_off_delay: None,
        })
    }

    #[test]
    fn test_kind_and_sensors() {
        let zone = sample_threshold();
        assert_eq!(zone.kind(), ZoneKind::Threshold);
        assert_eq!(zone.sensors().len(), 2);

        let burst = ZoneConfig::Burst(BurstZone {
            sensors: vec![DeviceId::new(3)],
            activity_window: Duration::from_secs(60),
            activity_count: 3,
        });
        assert_eq!(burst.kind(), ZoneKind::Burst);
    }

    #[test]
    fn test_serde_tagged_roundtrip() {
        let zone = sample_threshold();
        let json = serde_json::to_value(&zone).unwrap();
        assert_eq!(json["kind"], "threshold");
        assert_eq!(json["on_delay"], 5.0);

        let parsed: ZoneConfig = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, zone);
    }

    #[test]
    fn test_fractional_delay_roundtrip() {
        let zone = ZoneConfig::Threshold(ThresholdZone {
            sensors: vec![DeviceId::new(9)],
            aggregation: AggregationMode::Any,
            polarity: SensorPolarity::Change,
            on_delay: Duration::from_millis(1500),
            off_delay: Duration::ZERO,
            force_off_delay: Some(Duration::from_secs(600)),
        });

        let json = serde_json::to_string(&zone).unwrap();
        let parsed: ZoneConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, zone);
    }

    #[test]
    fn test_negative_duration_rejected() {
        let json = serde_json::json!({
            "kind": "burst",
            "sensors": ["1"],
            "activity_window": -10.0,
            "activity_count": 3
        });
        assert!(serde_json::from_value::<ZoneConfig>(json).is_err());
    }
}
