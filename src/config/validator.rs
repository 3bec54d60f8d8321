//! Configuration validation.
//!
//! Structural rules (URL shape, ranges, non-empty strings) come from the
//! `validator` derives on the config types. The checks here add the rules
//! that span fields or only deserve a warning.

use crate::error::{ConfigError, Result, SlbError};
use crate::slb::PAGE_SIZE_LARGE;
use std::collections::HashSet;
use tracing::debug;
use ::validator::{Validate, ValidationErrors, ValidationErrorsKind};

use super::spec::{AppConfig, ProviderConfig, SweepConfig};

/// Shortest sweep prefix accepted. Shorter ones would match foreign records.
pub const MIN_SWEEP_PREFIX_LEN: usize = 4;

/// Concurrency above which a warning is emitted.
const HIGH_CONCURRENCY: usize = 16;

/// Validator for `slbctl` configuration.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a configuration.
    ///
    /// # Errors
    ///
    /// Returns the first error if validation fails.
    pub fn validate(&self, config: &AppConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(SlbError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Collects every error and warning without failing.
    #[must_use]
    pub fn check(&self, config: &AppConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        if let Err(errors) = config.validate() {
            collect_structural("", &errors, &mut result);
        }
        Self::validate_provider(&config.provider, &mut result);
        Self::validate_sweep(&config.sweep, &mut result);

        result
            .errors
            .sort_by(|a, b| a.field.cmp(&b.field).then_with(|| a.message.cmp(&b.message)));
        result
    }

    fn validate_provider(provider: &ProviderConfig, result: &mut ValidationResult) {
        let endpoint = provider.endpoint.to_ascii_lowercase();
        let local = ["://localhost", "://127.0.0.1", "://[::1]"]
            .iter()
            .any(|host| endpoint.contains(host));

        if endpoint.starts_with("http://") && !local {
            result.warnings.push(format!(
                "Endpoint '{}' is not HTTPS; the access token is sent in clear text",
                provider.endpoint
            ));
        }
    }

    fn validate_sweep(sweep: &SweepConfig, result: &mut ValidationResult) {
        if sweep.prefixes.is_empty() {
            result
                .warnings
                .push(String::from("No sweep prefixes defined; only network and lineage rules apply"));
        }

        let mut seen = HashSet::new();
        for (i, prefix) in sweep.prefixes.iter().enumerate() {
            if prefix.trim().len() < MIN_SWEEP_PREFIX_LEN {
                result.errors.push(ValidationError {
                    field: format!("sweep.prefixes[{i}]"),
                    message: format!(
                        "Sweep prefix '{prefix}' is too broad. Must be at least {MIN_SWEEP_PREFIX_LEN} characters."
                    ),
                });
            }
            if !seen.insert(prefix.to_ascii_lowercase()) {
                result.warnings.push(format!("Duplicate sweep prefix: {prefix}"));
            }
        }

        let mut regions = HashSet::new();
        for (i, region) in sweep.regions.iter().enumerate() {
            if region.is_empty() {
                result.errors.push(ValidationError {
                    field: format!("sweep.regions[{i}]"),
                    message: String::from("Region cannot be empty"),
                });
            } else if !regions.insert(region) {
                result.errors.push(ValidationError {
                    field: format!("sweep.regions[{i}]"),
                    message: format!("Duplicate region: {region}"),
                });
            }
        }

        if sweep.page_size > PAGE_SIZE_LARGE {
            result.errors.push(ValidationError {
                field: String::from("sweep.page_size"),
                message: format!("Page size cannot exceed {PAGE_SIZE_LARGE}"),
            });
        }

        if sweep.concurrency > HIGH_CONCURRENCY {
            result.warnings.push(format!(
                "Sweep concurrency {} may trigger throttling",
                sweep.concurrency
            ));
        }

        if !sweep.disable_protection {
            result.warnings.push(String::from(
                "disable_protection is off; protected orphans will fail to delete",
            ));
        }
    }
}

/// Flattens derive errors into dotted field paths.
fn collect_structural(prefix: &str, errors: &ValidationErrors, result: &mut ValidationResult) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };

        match kind {
            ValidationErrorsKind::Field(list) => {
                for error in list {
                    result.errors.push(ValidationError {
                        field: path.clone(),
                        message: error
                            .message
                            .as_ref()
                            .map_or_else(|| error.code.to_string(), ToString::to_string),
                    });
                }
            }
            ValidationErrorsKind::Struct(inner) => collect_structural(&path, inner, result),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect_structural(&format!("{path}[{index}]"), inner, result);
                }
            }
        }
    }
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
