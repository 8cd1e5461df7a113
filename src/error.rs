//! Error types for GhostBus.
//!
//! All errors in GhostBus are strongly typed using thiserror.
//! A lookup miss is not an error: point reads return `Option`.

use thiserror::Error;

/// Validation errors raised before any state is touched.
///
/// Every variant names the offending field so callers can report it back to
/// the producer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Field '{field}' cannot be empty")]
    EmptyField {
        field: String,
    },

    #[error("Field '{field}' value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Field '{field}' must be a finite number")]
    NotFinite {
        field: String,
    },

    #[error("Field '{field}' must not be negative (got {value})")]
    Negative {
        field: String,
        value: f64,
    },

    #[error("Field '{field}' exceeds maximum length of {max_length}")]
    FieldTooLong {
        field: String,
        max_length: usize,
    },

    #[error("Invalid configuration '{field}': {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },
}

impl ValidationError {
    /// Name of the field that failed validation.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::EmptyField { field }
            | Self::OutOfRange { field, .. }
            | Self::NotFinite { field }
            | Self::Negative { field, .. }
            | Self::FieldTooLong { field, .. }
            | Self::InvalidConfig { field, .. } => field,
        }
    }
}

/// Registry backend errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Backend error (e.g. a poisoned lock).
    #[error("Registry backend error: {0}")]
    BackendError(String),
}

/// Errors observed by a subscriber reading its event stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("Subscription disconnected")]
    Disconnected,

    #[error("No event received within {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Subscription queue is empty")]
    Empty,
}

/// Top-level error type for GhostBus.
#[derive(Debug, Error)]
pub enum GhostError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Hub error: {0}")]
    Hub(#[from] HubError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl GhostError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns the validation error, if this is one.
    #[must_use]
    pub const fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(e) => Some(e),
            _ => None,
        }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Registry(_) | Self::Internal { .. } => false,
            Self::Hub(e) => matches!(e, HubError::Timeout { .. } | HubError::Empty),
        }
    }
}

/// Result type alias for GhostBus operations.
pub type GhostResult<T> = Result<T, GhostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_names_field() {
        let err = ValidationError::OutOfRange {
            field: "lat".to_string(),
            value: 200.0,
            min: -90.0,
            max: 90.0,
        };
        assert_eq!(err.field(), "lat");
        let msg = format!("{err}");
        assert!(msg.contains("lat"));
        assert!(msg.contains("200"));
    }

    #[test]
    fn test_empty_field_message() {
        let err = ValidationError::EmptyField {
            field: "id".to_string(),
        };
        assert_eq!(err.field(), "id");
        assert!(format!("{err}").contains("cannot be empty"));
    }

    #[test]
    fn test_hub_timeout_message() {
        let err = HubError::Timeout { duration_ms: 250 };
        assert!(format!("{err}").contains("250ms"));
    }

    #[test]
    fn test_ghost_error_from_validation() {
        let err: GhostError = ValidationError::NotFinite {
            field: "speed".to_string(),
        }
        .into();
        assert!(err.is_validation());
        assert!(!err.is_retryable());
        assert_eq!(err.as_validation().map(ValidationError::field), Some("speed"));
    }

    #[test]
    fn test_ghost_error_retryable() {
        let err: GhostError = HubError::Timeout { duration_ms: 10 }.into();
        assert!(err.is_retryable());

        let err: GhostError = HubError::Disconnected.into();
        assert!(!err.is_retryable());

        let err: GhostError = RegistryError::BackendError("poisoned lock".to_string()).into();
        assert!(!err.is_retryable());

        let err = GhostError::internal("unexpected state");
        assert!(!err.is_retryable());
        assert!(format!("{err}").contains("unexpected state"));
    }
}
