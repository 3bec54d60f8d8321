//! Configuration types for `slbctl.yaml`.
//!
//! Every section has defaults, so an empty file (or no file at all) yields a
//! usable configuration once the endpoint and region are set.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::retry::{RetryPolicy, DEFAULT_BASE_DELAY_MS, DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_MAX_ATTEMPTS};
use crate::reconciler::{DEFAULT_CONFIRM_ATTEMPTS, DEFAULT_CONFIRM_DELAY_MS};
use crate::slb::PAGE_SIZE_LARGE;
use crate::sweep::{
    SweepOptions, DEFAULT_LINEAGE_TAG_PREFIX, DEFAULT_SWEEP_CONCURRENCY, DEFAULT_SWEEP_PREFIXES,
};

/// Default control-plane endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8080";

/// Default region.
pub const DEFAULT_REGION: &str = "cn-hangzhou";

/// The root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Control-plane connection settings.
    #[validate(nested)]
    pub provider: ProviderConfig,
    /// Retry and confirmation settings.
    #[validate(nested)]
    pub retry: RetryConfig,
    /// Sweep settings.
    #[validate(nested)]
    pub sweep: SweepConfig,
}

/// Control-plane connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// Base URL of the control plane.
    #[validate(url(message = "Endpoint must be a valid URL"))]
    pub endpoint: String,
    /// Region every operation is bound to.
    #[validate(length(min = 1, message = "Region cannot be empty"))]
    pub region: String,
    /// Per-request timeout in seconds.
    #[validate(range(min = 1, max = 600, message = "Timeout must be between 1 and 600 seconds"))]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            region: DEFAULT_REGION.to_string(),
            timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
        }
    }
}

impl ProviderConfig {
    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Retry and confirmation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Attempts per remote call, including the first.
    #[validate(range(min = 1, max = 20, message = "Max attempts must be between 1 and 20"))]
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds.
    #[validate(range(max = 60_000, message = "Base delay cannot exceed 60000 ms"))]
    pub base_delay_ms: u64,
    /// Reads made to confirm a mutation.
    #[validate(range(min = 1, max = 100, message = "Confirm attempts must be between 1 and 100"))]
    pub confirm_attempts: u32,
    /// Delay between confirmation reads in milliseconds.
    #[validate(range(max = 60_000, message = "Confirm delay cannot exceed 60000 ms"))]
    pub confirm_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            confirm_attempts: DEFAULT_CONFIRM_ATTEMPTS,
            confirm_delay_ms: DEFAULT_CONFIRM_DELAY_MS,
        }
    }
}

impl RetryConfig {
    /// Builds the retry policy, using `call_timeout` per attempt.
    #[must_use]
    pub const fn policy(&self, call_timeout: Duration) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            call_timeout,
        )
    }

    /// Delay between confirmation reads.
    #[must_use]
    pub const fn confirm_delay(&self) -> Duration {
        Duration::from_millis(self.confirm_delay_ms)
    }
}

/// Sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct SweepConfig {
    /// Regions to sweep. Empty means the provider region.
    pub regions: Vec<String>,
    /// Name prefixes of records created by test runs.
    pub prefixes: Vec<String>,
    /// Tag key prefix linking records to container clusters.
    #[validate(length(min = 1, message = "Lineage tag prefix cannot be empty"))]
    pub lineage_prefix: String,
    /// Records per listing page.
    #[validate(range(min = 1, message = "Page size must be at least 1"))]
    pub page_size: u32,
    /// Maximum concurrent deletes.
    #[validate(range(min = 1, max = 64, message = "Concurrency must be between 1 and 64"))]
    pub concurrency: usize,
    /// Switch delete protection off before deleting owned records.
    pub disable_protection: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            regions: Vec::new(),
            prefixes: DEFAULT_SWEEP_PREFIXES.iter().map(ToString::to_string).collect(),
            lineage_prefix: DEFAULT_LINEAGE_TAG_PREFIX.to_string(),
            page_size: PAGE_SIZE_LARGE,
            concurrency: DEFAULT_SWEEP_CONCURRENCY,
            disable_protection: true,
        }
    }
}

impl SweepConfig {
    /// Builds engine options.
    #[must_use]
    pub fn options(&self, dry_run: bool) -> SweepOptions {
        SweepOptions {
            page_size: self.page_size,
            concurrency: self.concurrency,
            dry_run,
            disable_protection: self.disable_protection,
            prefixes: self.prefixes.clone(),
            lineage_prefix: self.lineage_prefix.clone(),
        }
    }

    /// Regions to sweep, falling back to `default_region`.
    #[must_use]
    pub fn regions_or(&self, default_region: &str) -> Vec<String> {
        if self.regions.is_empty() {
            vec![default_region.to_string()]
        } else {
            self.regions.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();

        assert_eq!(config, AppConfig::default());
        assert_eq!(config.sweep.page_size, PAGE_SIZE_LARGE);
        assert!(config.sweep.disable_protection);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_structural_validation() {
        let mut config = AppConfig::default();
        config.provider.endpoint = String::from("not a url");
        config.retry.max_attempts = 0;

        let errors = config.validate().unwrap_err();
        let fields = errors.errors();
        assert!(fields.contains_key("provider"));
        assert!(fields.contains_key("retry"));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let yaml = "provider:\n  endpoint: http://localhost\n  zone: a\n";
        assert!(serde_yaml::from_str::<AppConfig>(yaml).is_err());
    }

    #[test]
    fn test_sweep_regions_fallback() {
        let sweep = SweepConfig::default();
        assert_eq!(sweep.regions_or("cn-test"), vec![String::from("cn-test")]);

        let options = sweep.options(true);
        assert!(options.dry_run);
        assert_eq!(options.prefixes.len(), DEFAULT_SWEEP_PREFIXES.len());
    }
}
