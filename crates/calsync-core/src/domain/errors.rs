//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including identifier validation and stored-record decoding.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid provider event identifier
    #[error("Invalid event ID: {0}")]
    InvalidEventId(String),

    /// Invalid provider calendar identifier
    #[error("Invalid calendar ID: {0}")]
    InvalidCalendarId(String),

    /// A persisted record could not be decoded
    #[error("Malformed stored record '{key}': {reason}")]
    MalformedRecord {
        /// Storage key the record was read from
        key: String,
        /// Decoder error message
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::InvalidEventId("".to_string());
        assert_eq!(err.to_string(), "Invalid event ID: ");

        let err = DomainError::MalformedRecord {
            key: "localEvents".to_string(),
            reason: "expected value at line 1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Malformed stored record 'localEvents': expected value at line 1"
        );
    }

    #[test]
    fn test_error_equality() {
        let err1 = DomainError::InvalidCalendarId("a".to_string());
        let err2 = DomainError::InvalidCalendarId("a".to_string());
        let err3 = DomainError::InvalidCalendarId("b".to_string());

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }
}
