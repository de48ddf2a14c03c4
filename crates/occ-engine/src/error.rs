//! Engine error taxonomy

use occ_config::ConfigError;
use occ_core::DeviceId;
use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors from engine operations
///
/// Timer-state mismatches (cancel/complete with no outstanding timer) are
/// deliberately absent: they are warn-logged no-ops, never errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("zone not found: {0}")]
    ZoneNotFound(DeviceId),

    #[error("trigger not found: {0}")]
    TriggerNotFound(DeviceId),

    #[error("already active: {0}")]
    AlreadyActive(DeviceId),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
