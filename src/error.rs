//! Error types for the load balancer reconciliation system.
//!
//! This module provides the error hierarchy for every stage of the
//! lifecycle: configuration, remote API calls, reconciliation, and sweeping.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the reconciliation system.
#[derive(Debug, Error)]
pub enum SlbError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Remote API errors.
    #[error("Load balancer API error: {0}")]
    Api(#[from] ApiError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Sweep errors.
    #[error("Sweep error: {0}")]
    Sweep(#[from] SweepError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },
}

/// Errors reported by the remote load balancer control plane.
///
/// The variants mirror the taxonomy the reconciler and sweeper act on:
/// transient failures are retried, everything else is surfaced.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The remote side reports no such resource.
    #[error("Resource not found: {resource}")]
    NotFound {
        /// Identifier or name that was looked up.
        resource: String,
    },

    /// Network failure or server-side error that may succeed on retry.
    #[error("Transient API failure: {message}")]
    Transient {
        /// Description of the failure.
        message: String,
    },

    /// Request was throttled.
    #[error("API rate limited, retry after {retry_after_secs} seconds")]
    Throttled {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// The call did not complete within its deadline.
    #[error("{operation} timed out after {after_ms} ms")]
    Timeout {
        /// Operation that timed out.
        operation: String,
        /// Deadline that elapsed.
        after_ms: u64,
    },

    /// Credentials lack permission for the call.
    #[error("Permission denied: {message}")]
    PermissionDenied {
        /// Description of the denial.
        message: String,
    },

    /// The request was rejected as invalid.
    #[error("Request rejected: {message}")]
    Validation {
        /// Description of the rejection.
        message: String,
    },

    /// Invalid response from the API.
    #[error("Invalid response from API: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The declared state violates a joint field constraint.
    #[error("Invalid declaration for '{field}': {message}")]
    InvalidDeclaration {
        /// Offending field.
        field: String,
        /// Description of the violation.
        message: String,
    },

    /// The resource could not be created and confirmed.
    #[error("Failed to create load balancer: {reason}")]
    CreateFailed {
        /// Reason for failure.
        reason: String,
    },

    /// A diff touched fields that can only change through destroy-and-recreate.
    #[error("Immutable field(s) changed, recreate required: {}", .fields.join(", "))]
    ImmutableFieldChanged {
        /// Names of the immutable fields that differ.
        fields: Vec<String>,
    },

    /// The update was applied but a re-read still differs.
    #[error("Load balancer {id} did not converge on: {}", .fields.join(", "))]
    NotConverged {
        /// Resource identifier.
        id: String,
        /// Fields that still differ.
        fields: Vec<String>,
    },

    /// The resource could not be deleted.
    #[error("Failed to delete load balancer {id}: {source}")]
    DeleteFailed {
        /// Resource identifier.
        id: String,
        /// Underlying error.
        #[source]
        source: Box<SlbError>,
    },

    /// Transient failures persisted across every attempt.
    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Operation that was retried.
        operation: String,
        /// Number of attempts made.
        attempts: u32,
        /// Last error observed.
        #[source]
        source: Box<SlbError>,
    },

    /// The caller cancelled the operation at a call boundary.
    #[error("{operation} cancelled")]
    Cancelled {
        /// Operation that was interrupted.
        operation: String,
    },

    /// Another holder is operating on the same resource.
    #[error("Load balancer {resource_id} is leased by {holder} (since {since})")]
    ResourceBusy {
        /// Resource identifier.
        resource_id: String,
        /// Current lease holder.
        holder: String,
        /// When the lease was acquired.
        since: String,
    },
}

/// Sweep errors.
#[derive(Debug, Error)]
pub enum SweepError {
    /// Enumerating the region failed, nothing can be classified safely.
    #[error("Failed to list load balancers in region {region}: {source}")]
    ListingFailed {
        /// Region being swept.
        region: String,
        /// Underlying error.
        #[source]
        source: Box<SlbError>,
    },

    /// The sweeper dependency table contains a cycle.
    #[error("Circular sweeper dependency detected: {cycle}")]
    DependencyCycle {
        /// Sweepers participating in the cycle.
        cycle: String,
    },

    /// A sweeper depends on a name that was never registered.
    #[error("Sweeper '{sweeper}' depends on unknown sweeper '{dependency}'")]
    UnknownDependency {
        /// Declaring sweeper.
        sweeper: String,
        /// Missing dependency.
        dependency: String,
    },
}

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, SlbError>;

impl SlbError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Api(
                ApiError::Transient { .. } | ApiError::Throttled { .. } | ApiError::Timeout { .. }
            )
        )
    }

    /// Returns true if the remote side reported the resource as missing.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Api(ApiError::NotFound { .. }))
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Api(ApiError::Throttled { retry_after_secs }) => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl ApiError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Creates a transient error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

impl ReconcileError {
    /// Creates an invalid declaration error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDeclaration {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SlbError::from(ApiError::transient("reset")).is_retryable());
        assert!(SlbError::from(ApiError::Throttled { retry_after_secs: 3 }).is_retryable());
        assert!(!SlbError::from(ApiError::validation("bad")).is_retryable());
        assert!(!SlbError::from(ApiError::not_found("lb-1")).is_retryable());
    }

    #[test]
    fn test_immutable_error_names_fields() {
        let err = ReconcileError::ImmutableFieldChanged {
            fields: vec![String::from("address_type"), String::from("vswitch_id")],
        };
        let message = err.to_string();
        assert!(message.contains("address_type"));
        assert!(message.contains("vswitch_id"));
    }

    #[test]
    fn test_exhaustion_reports_attempts() {
        let err = ReconcileError::RetriesExhausted {
            operation: String::from("describe lb-1"),
            attempts: 4,
            source: Box::new(ApiError::transient("503").into()),
        };
        assert!(err.to_string().contains("after 4 attempts"));
    }
}
