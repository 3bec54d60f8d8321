//! Configuration module for `slbctl`.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `slbctl.yaml`
//! - Environment overrides and `.env` loading
//! - Validation of configuration values

mod parser;
mod spec;
mod validator;

pub use self::parser::{find_config_file, ConfigParser, ACCESS_TOKEN_VAR, DEFAULT_CONFIG_FILES};
pub use self::spec::{
    AppConfig, ProviderConfig, RetryConfig, SweepConfig, DEFAULT_ENDPOINT, DEFAULT_REGION,
};
pub use self::validator::{ConfigValidator, ValidationError, ValidationResult, MIN_SWEEP_PREFIX_LEN};
