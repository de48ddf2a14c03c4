//! Configuration parsing for the occupancy engine
//!
//! The host persists zone and trigger configuration as flat string
//! key-value property maps. This crate turns those maps into validated
//! [`occ_core::ZoneConfig`] / [`occ_core::TriggerConfig`] values, reporting
//! every invalid field at once as a field -> message map.

mod error;
mod props;

pub use error::{ConfigError, ConfigResult};
pub use props::{keys, parse_burst_zone, parse_threshold_zone, parse_trigger, PropertyMap};
