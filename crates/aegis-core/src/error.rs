//! Error types for Aegis.
//!
//! Errors fall into two classes with different propagation rules:
//!
//! | Class                   | Raised                  | Effect                                   |
//! |-------------------------|-------------------------|------------------------------------------|
//! | [`ConfigurationError`]  | while building a chain  | fatal to startup (or to a reload)        |
//! | [`ResolverError`]       | per request, by a source| logged, then treated as "no match"       |
//!
//! Per-request validation failures (a pre-flight asking for a forbidden
//! method, say) are not errors at all: the CORS stage turns them into a
//! rejection response and the chain short-circuits.

use thiserror::Error;

/// Result type alias using [`ConfigurationError`].
pub type ConfigurationResult<T> = Result<T, ConfigurationError>;

/// A build-time configuration error.
///
/// Returned while converting stage configuration into a chain. None of these
/// can be raised while serving a request.
///
/// # Example
///
/// ```
/// use aegis_core::ConfigurationError;
///
/// let err = ConfigurationError::unrecognized_value("xss_protection", "SOMETIMES");
/// assert!(err.to_string().contains("SOMETIMES"));
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// A closed-set value (header value enum, stage kind) was not recognized.
    #[error("unrecognized value '{value}' for {field}")]
    UnrecognizedValue {
        /// The field or enum being parsed.
        field: String,
        /// The rejected input.
        value: String,
    },

    /// An enabled stage has no payload and its kind has no built-in default.
    #[error("stage '{stage}' is enabled but {field} is not set and has no default")]
    MissingPayload {
        /// The stage name.
        stage: &'static str,
        /// The missing field.
        field: &'static str,
    },

    /// A payload was assigned to a stage configuration of another kind.
    #[error("payload for stage '{payload}' cannot configure stage '{stage}'")]
    PayloadMismatch {
        /// The stage being configured.
        stage: &'static str,
        /// The stage the payload belongs to.
        payload: &'static str,
    },

    /// A CORS configuration is internally inconsistent.
    #[error("invalid CORS configuration for '{pattern}': {reason}")]
    InvalidCors {
        /// The path pattern the configuration is mapped to.
        pattern: String,
        /// Why the configuration was rejected.
        reason: String,
    },

    /// A path pattern could not be parsed.
    #[error("invalid path pattern '{pattern}': {reason}")]
    InvalidPathPattern {
        /// The offending pattern.
        pattern: String,
        /// Why the pattern was rejected.
        reason: String,
    },

    /// A rejection status is not a client or server error.
    #[error("rejection status {status} must be a 4xx or 5xx code")]
    InvalidRejectionStatus {
        /// The offending status code.
        status: u16,
    },

    /// A header value cannot be encoded on the wire.
    #[error("invalid value for header {header}: {reason}")]
    InvalidHeaderValue {
        /// The header name.
        header: String,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigurationError {
    /// Creates an unrecognized value error.
    pub fn unrecognized_value(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::UnrecognizedValue {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Creates an invalid CORS configuration error.
    pub fn invalid_cors(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCors {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid path pattern error.
    pub fn invalid_path_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPathPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid header value error.
    pub fn invalid_header_value(header: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidHeaderValue {
            header: header.into(),
            reason: reason.into(),
        }
    }
}

/// Failure reported by a CORS configuration source while resolving a path.
///
/// The chain never propagates this error. The CORS stage logs it and proceeds
/// as if no configuration matched, so no CORS headers are written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("CORS configuration resolution failed: {message}")]
pub struct ResolverError {
    message: String,
}

impl ResolverError {
    /// Creates a resolver error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrecognized_value_display() {
        let err = ConfigurationError::unrecognized_value("frame_options", "ALLOW_ALL");
        assert_eq!(
            err.to_string(),
            "unrecognized value 'ALLOW_ALL' for frame_options"
        );
    }

    #[test]
    fn test_missing_payload_display() {
        let err = ConfigurationError::MissingPayload {
            stage: "content_security_policy",
            field: "policy_directives",
        };
        assert!(err.to_string().contains("content_security_policy"));
        assert!(err.to_string().contains("policy_directives"));
    }

    #[test]
    fn test_invalid_cors_display() {
        let err = ConfigurationError::invalid_cors("/api/**", "wildcard origin with credentials");
        assert!(err.to_string().contains("/api/**"));
        assert!(err.to_string().contains("credentials"));
    }

    #[test]
    fn test_invalid_rejection_status_display() {
        let err = ConfigurationError::InvalidRejectionStatus { status: 204 };
        assert_eq!(err.to_string(), "rejection status 204 must be a 4xx or 5xx code");
    }

    #[test]
    fn test_resolver_error() {
        let err = ResolverError::new("backend unavailable");
        assert_eq!(err.message(), "backend unavailable");
        assert!(err.to_string().contains("backend unavailable"));
    }
}
