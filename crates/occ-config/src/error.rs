//! Error types for configuration parsing and validation

use std::collections::BTreeMap;
use thiserror::Error;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while parsing zone or trigger configuration
///
/// Validation is fully checked: every offending field is reported, keyed by
/// field name, rather than stopping at the first failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: {}", join_field_errors(errors))]
    Invalid {
        /// field name -> human-readable message
        errors: BTreeMap<String, String>,
    },
}

impl ConfigError {
    /// Build an error for a single field
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(field.into(), message.into());
        ConfigError::Invalid { errors }
    }

    /// The per-field error map
    pub fn errors(&self) -> &BTreeMap<String, String> {
        match self {
            ConfigError::Invalid { errors } => errors,
        }
    }
}

fn join_field_errors(errors: &BTreeMap<String, String>) -> String {
    errors
        .iter()
        .map(|(field, message)| format!("{}: {}", field, message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Accumulates per-field validation errors during a parse pass
#[derive(Debug, Default)]
pub(crate) struct FieldErrors {
    errors: BTreeMap<String, String>,
}

impl FieldErrors {
    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.errors.entry(field.to_string()).or_insert(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Ok(value) when nothing was collected, the full error map otherwise
    pub fn finish<T>(self, value: T) -> ConfigResult<T> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(ConfigError::Invalid {
                errors: self.errors,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_joins_fields() {
        let mut errors = BTreeMap::new();
        errors.insert("sensors".to_string(), "must not be empty".to_string());
        errors.insert("on_delay".to_string(), "missing".to_string());

        let err = ConfigError::Invalid { errors };
        let text = err.to_string();
        assert!(text.contains("sensors: must not be empty"));
        assert!(text.contains("on_delay: missing"));
    }

    #[test]
    fn test_first_message_per_field_wins() {
        let mut errors = FieldErrors::default();
        errors.push("sensors", "first");
        errors.push("sensors", "second");

        let err = errors.finish(()).unwrap_err();
        assert_eq!(err.errors()["sensors"], "first");
    }
}
