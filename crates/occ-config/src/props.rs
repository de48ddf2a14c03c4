//! Parsing of host device properties into validated configuration
//!
//! The host persists configuration as flat string key-value maps per device.
//! Sensor lists arrive as comma-joined decimal id strings, enums as lowercase
//! tags, numeric fields as decimal strings. Every field is checked
//! independently and all failures are reported together.

use std::collections::BTreeMap;
use std::time::Duration;

use occ_core::{
    AggregationMode, BurstZone, SensorPolarity, ThresholdZone, TriggerConfig, TriggerPolarity,
    ZoneConfig, ZoneId,
};
use tracing::trace;

use crate::error::{ConfigResult, FieldErrors};

/// Property map as delivered by the host
pub type PropertyMap = BTreeMap<String, String>;

/// Property keys for zone and trigger devices
pub mod keys {
    pub const SENSORS: &str = "sensors";
    pub const AGGREGATION: &str = "aggregation";
    pub const POLARITY: &str = "polarity";
    pub const ON_DELAY: &str = "on_delay";
    pub const OFF_DELAY: &str = "off_delay";
    pub const FORCE_OFF_DELAY: &str = "force_off_delay";
    pub const ACTIVITY_WINDOW: &str = "activity_window";
    pub const ACTIVITY_COUNT: &str = "activity_count";
    pub const ZONE: &str = "zone";
    pub const TRIGGER_POLARITY: &str = "trigger_polarity";
}

/// Parse a threshold zone's properties
///
/// Checks every field and reports all failures keyed by property name.
/// `zone_id` is the id of the zone device itself, used to reject direct
/// self-references in the sensor list.
pub fn parse_threshold_zone(zone_id: ZoneId, props: &PropertyMap) -> ConfigResult<ZoneConfig> {
    let mut errors = FieldErrors::default();
    trace!(zone_id = %zone_id, "Parsing threshold zone properties");

    let sensors = parse_sensor_list(zone_id, props, &mut errors);

    let aggregation = match props.get(keys::AGGREGATION).map(String::as_str) {
        None | Some("all") => AggregationMode::All,
        Some("any") => AggregationMode::Any,
        Some(other) => {
            errors.push(
                keys::AGGREGATION,
                format!("unknown aggregation mode '{}' (expected 'all' or 'any')", other),
            );
            AggregationMode::All
        }
    };

    let polarity = match props.get(keys::POLARITY).map(String::as_str) {
        None | Some("on") => SensorPolarity::On,
        Some("off") => SensorPolarity::Off,
        Some("change") => SensorPolarity::Change,
        Some(other) => {
            errors.push(
                keys::POLARITY,
                format!(
                    "unknown sensor polarity '{}' (expected 'on', 'off' or 'change')",
                    other
                ),
            );
            SensorPolarity::On
        }
    };

    let on_delay = parse_required_duration(props, keys::ON_DELAY, &mut errors);
    let off_delay = parse_required_duration(props, keys::OFF_DELAY, &mut errors);

    let force_off_delay = match props.get(keys::FORCE_OFF_DELAY) {
        Some(raw) => parse_duration_value(raw, keys::FORCE_OFF_DELAY, &mut errors),
        None => None,
    };

    if polarity == SensorPolarity::Change {
        match force_off_delay {
            None if !props.contains_key(keys::FORCE_OFF_DELAY) => {
                errors.push(
                    keys::FORCE_OFF_DELAY,
                    "required when polarity is 'change'",
                );
            }
            Some(d) if d.is_zero() => {
                errors.push(
                    keys::FORCE_OFF_DELAY,
                    "must be greater than zero when polarity is 'change'",
                );
            }
            _ => {}
        }
    }

    errors.finish(ZoneConfig::Threshold(ThresholdZone {
        sensors,
        aggregation,
        polarity,
        on_delay: on_delay.unwrap_or(Duration::ZERO),
        off_delay: off_delay.unwrap_or(Duration::ZERO),
        force_off_delay,
    }))
}

/// Parse a burst (activity window) zone's properties
pub fn parse_burst_zone(zone_id: ZoneId, props: &PropertyMap) -> ConfigResult<ZoneConfig> {
    let mut errors = FieldErrors::default();
    trace!(zone_id = %zone_id, "Parsing burst zone properties");

    let sensors = parse_sensor_list(zone_id, props, &mut errors);

    let activity_window = parse_required_duration(props, keys::ACTIVITY_WINDOW, &mut errors);
    if let Some(window) = activity_window {
        if window.is_zero() {
            errors.push(keys::ACTIVITY_WINDOW, "must be greater than zero");
        }
    }

    let activity_count = match props.get(keys::ACTIVITY_COUNT) {
        None => {
            errors.push(keys::ACTIVITY_COUNT, "missing required field");
            0
        }
        Some(raw) => match raw.trim().parse::<usize>() {
            Ok(0) => {
                errors.push(keys::ACTIVITY_COUNT, "must be greater than zero");
                0
            }
            Ok(count) => count,
            Err(_) => {
                errors.push(
                    keys::ACTIVITY_COUNT,
                    format!("not a positive integer: '{}'", raw),
                );
                0
            }
        },
    };

    errors.finish(ZoneConfig::Burst(BurstZone {
        sensors,
        activity_window: activity_window.unwrap_or(Duration::ZERO),
        activity_count,
    }))
}

/// Parse a trigger subscription's properties
pub fn parse_trigger(props: &PropertyMap) -> ConfigResult<TriggerConfig> {
    let mut errors = FieldErrors::default();

    let zone_id = match props.get(keys::ZONE) {
        None => {
            errors.push(keys::ZONE, "missing required field");
            None
        }
        Some(raw) => match raw.parse::<ZoneId>() {
            Ok(id) => Some(id),
            Err(e) => {
                errors.push(keys::ZONE, e.to_string());
                None
            }
        },
    };

    let polarity = match props.get(keys::TRIGGER_POLARITY).map(String::as_str) {
        Some("occupied") => Some(TriggerPolarity::Occupied),
        Some("unoccupied") => Some(TriggerPolarity::Unoccupied),
        Some(other) => {
            errors.push(
                keys::TRIGGER_POLARITY,
                format!(
                    "unknown trigger polarity '{}' (expected 'occupied' or 'unoccupied')",
                    other
                ),
            );
            None
        }
        None => {
            errors.push(keys::TRIGGER_POLARITY, "missing required field");
            None
        }
    };

    match (zone_id, polarity) {
        (Some(zone_id), Some(polarity)) => errors.finish(TriggerConfig { zone_id, polarity }),
        // errors is non-empty here, so finish always reports them
        _ => errors.finish(TriggerConfig {
            zone_id: ZoneId::new(0),
            polarity: TriggerPolarity::Occupied,
        }),
    }
}

// --- Field helpers ---

fn parse_sensor_list(
    zone_id: ZoneId,
    props: &PropertyMap,
    errors: &mut FieldErrors,
) -> Vec<occ_core::DeviceId> {
    let raw = match props.get(keys::SENSORS) {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => {
            errors.push(keys::SENSORS, "sensor list must not be empty");
            return Vec::new();
        }
    };

    let mut sensors = Vec::new();
    for part in raw.split(',') {
        match part.parse::<occ_core::DeviceId>() {
            Ok(id) if id == zone_id => {
                errors.push(keys::SENSORS, "zone cannot watch itself");
            }
            Ok(id) => {
                if !sensors.contains(&id) {
                    sensors.push(id);
                }
            }
            Err(e) => {
                errors.push(keys::SENSORS, e.to_string());
            }
        }
    }

    if sensors.is_empty() && errors.is_empty() {
        errors.push(keys::SENSORS, "sensor list must not be empty");
    }

    sensors
}

fn parse_required_duration(
    props: &PropertyMap,
    field: &str,
    errors: &mut FieldErrors,
) -> Option<Duration> {
    match props.get(field) {
        None => {
            errors.push(field, "missing required field");
            None
        }
        Some(raw) => parse_duration_value(raw, field, errors),
    }
}

fn parse_duration_value(raw: &str, field: &str, errors: &mut FieldErrors) -> Option<Duration> {
    match raw.trim().parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => Some(Duration::from_secs_f64(secs)),
        Ok(_) => {
            errors.push(field, "must be a non-negative number of seconds");
            None
        }
        Err(_) => {
            errors.push(field, format!("not a number: '{}'", raw));
            None
        }
    }
}
