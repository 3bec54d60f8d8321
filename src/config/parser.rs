//! Configuration parser for loading and merging configuration files.
//!
//! This module handles loading configuration from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{ConfigError, Result, SlbError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::AppConfig;

/// Environment variable holding the control-plane access token.
pub const ACCESS_TOKEN_VAR: &str = "SLB_ACCESS_TOKEN";

/// Configuration parser for loading `slbctl` configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving the `.env` file.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving the `.env` file.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<AppConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(SlbError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            SlbError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string. Blank input yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<AppConfig> {
        debug!("Parsing YAML configuration");

        if content.trim().is_empty() {
            return Ok(AppConfig::default());
        }

        serde_yaml::from_str(content).map_err(|e| {
            let location = source.map_or_else(
                || e.location().map(|l| format!("line {}", l.line())),
                |p| Some(p.display().to_string()),
            );
            SlbError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })
    }

    /// Loads configuration from `path`, or discovers it, then applies
    /// environment overrides. Without any file the defaults are used.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file is missing or any file is invalid.
    pub fn load_with_env(&self, path: Option<&Path>) -> Result<AppConfig> {
        let mut config = match path {
            Some(path) => self.load_file(path)?,
            None => match std::env::current_dir().ok().and_then(|dir| find_config_file(dir).ok()) {
                Some(found) => self.load_file(found)?,
                None => {
                    debug!("No configuration file found, using defaults");
                    AppConfig::default()
                }
            },
        };

        Self::apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Applies `SLB_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if `SLB_PAGE_SIZE` is not a number.
    pub fn apply_env_overrides(
        config: &mut AppConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<()> {
        if let Some(endpoint) = lookup("SLB_ENDPOINT") {
            debug!("Overriding provider.endpoint from environment");
            config.provider.endpoint = endpoint;
        }

        if let Some(region) = lookup("SLB_REGION") {
            debug!("Overriding provider.region from environment");
            config.provider.region = region;
        }

        if let Some(page_size) = lookup("SLB_PAGE_SIZE") {
            debug!("Overriding sweep.page_size from environment");
            config.sweep.page_size = page_size.trim().parse().map_err(|_| {
                ConfigError::validation(
                    format!("SLB_PAGE_SIZE must be a positive integer, got '{page_size}'"),
                    "sweep.page_size",
                )
            })?;
        }

        Ok(())
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                SlbError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Gets the control-plane access token from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not set.
    pub fn access_token() -> Result<String> {
        std::env::var(ACCESS_TOKEN_VAR)
            .ok()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                SlbError::Config(ConfigError::MissingEnvVar {
                    name: String::from(ACCESS_TOKEN_VAR),
                })
            })
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["slbctl.yaml", "slbctl.yml"];

/// Finds the configuration file in `start_dir` or its parents, then in the
/// user configuration directory (`<config_dir>/slbctl/`).
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        if let Some(found) = config_file_in(&current) {
            return Ok(found);
        }

        if !current.pop() {
            break;
        }
    }

    if let Some(found) = dirs::config_dir().and_then(|dir| config_file_in(&dir.join("slbctl"))) {
        return Ok(found);
    }

    Err(SlbError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

fn config_file_in(dir: &Path) -> Option<PathBuf> {
    DEFAULT_CONFIG_FILES
        .iter()
        .map(|filename| dir.join(filename))
        .find(|path| path.exists())
        .inspect(|path| info!("Found configuration file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
provider:
  endpoint: https://slb.example.com
  region: cn-test
";
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(yaml, None).unwrap();

        assert_eq!(config.provider.endpoint, "https://slb.example.com");
        assert_eq!(config.provider.region, "cn-test");
        assert_eq!(config.retry.max_attempts, 4);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r"
provider:
  endpoint: https://slb.example.com
  region: cn-test
  timeout_secs: 10
retry:
  max_attempts: 2
  base_delay_ms: 100
  confirm_attempts: 5
  confirm_delay_ms: 200
sweep:
  regions: [cn-test, cn-other]
  prefixes: [tf-testAcc]
  lineage_prefix: k8s
  page_size: 20
  concurrency: 2
  disable_protection: false
";
        let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();

        assert_eq!(config.sweep.regions.len(), 2);
        assert_eq!(config.sweep.page_size, 20);
        assert!(!config.sweep.disable_protection);
        assert_eq!(config.retry.confirm_delay_ms, 200);
    }

    #[test]
    fn test_blank_file_uses_defaults() {
        let config = ConfigParser::new().parse_yaml("  \n", None).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_invalid_yaml_is_parse_error() {
        let result = ConfigParser::new().parse_yaml("provider: [", None);
        assert!(matches!(
            result,
            Err(SlbError::Config(ConfigError::ParseError { .. }))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SLB_ENDPOINT", "https://override.example.com"),
            ("SLB_REGION", "cn-env"),
            ("SLB_PAGE_SIZE", "10"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        ConfigParser::apply_env_overrides(&mut config, |name| {
            vars.get(name).map(ToString::to_string)
        })
        .unwrap();

        assert_eq!(config.provider.endpoint, "https://override.example.com");
        assert_eq!(config.provider.region, "cn-env");
        assert_eq!(config.sweep.page_size, 10);
    }

    #[test]
    fn test_bad_page_size_override() {
        let mut config = AppConfig::default();
        let result = ConfigParser::apply_env_overrides(&mut config, |name| {
            (name == "SLB_PAGE_SIZE").then(|| String::from("many"))
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_find_config_file_in_parent() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("slbctl.yml"), "sweep:\n  page_size: 5\n").unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, dir.path().join("slbctl.yml"));

        let config = ConfigParser::new().load_file(found).unwrap();
        assert_eq!(config.sweep.page_size, 5);
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ConfigParser::new().load_file(dir.path().join("absent.yaml"));
        assert!(matches!(
            result,
            Err(SlbError::Config(ConfigError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_dotenv_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ConfigParser::new().with_base_path(dir.path()).load_dotenv().is_ok());
    }
}
