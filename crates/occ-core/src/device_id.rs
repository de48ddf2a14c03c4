//! Device identifier type shared by sensors, zones and triggers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for invalid device identifiers
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceIdError {
    #[error("device id cannot be empty")]
    Empty,

    #[error("device id must be a decimal integer: '{0}'")]
    NotNumeric(String),
}

/// Identifies a device in the host registry
///
/// The host hands device references around as decimal strings (sensor lists
/// are comma-joined id strings), so the id round-trips through that form for
/// serde and Display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(u64);

impl DeviceId {
    /// Create a device id from its numeric value
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the numeric value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl FromStr for DeviceId {
    type Err = DeviceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(DeviceIdError::Empty);
        }
        trimmed
            .parse::<u64>()
            .map(Self)
            .map_err(|_| DeviceIdError::NotNumeric(trimmed.to_string()))
    }
}

impl TryFrom<String> for DeviceId {
    type Error = DeviceIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> String {
        id.to_string()
    }
}

impl From<u64> for DeviceId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A zone is itself a device in the host registry
pub type ZoneId = DeviceId;

/// Triggers are host devices as well
pub type TriggerId = DeviceId;
