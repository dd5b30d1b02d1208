//! Configuration loading
//!
//! Small helpers for reading settings from environment variables and from
//! YAML or JSON files, plus the [`StoreConfig`] they feed. Other crates in
//! the workspace reuse the helpers for their own configuration structs.
//!
//! ```rust,ignore
//! use async_store::config::{load_config_file, FromEnv, StoreConfig, ValidateConfig};
//!
//! let config: StoreConfig = load_config_file("store.yaml")?;
//! config.validate()?;
//!
//! let from_env = StoreConfig::from_env("ASYNC_STORE")?;
//! ```

use crate::error::{Result, StoreError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Get an environment variable as a string.
pub fn get_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|e| {
        StoreError::config(format!("Environment variable '{}' not found: {}", key, e))
    })
}

/// Get an environment variable with a default value.
pub fn get_env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get a boolean environment variable.
pub fn get_env_bool(key: &str) -> Result<bool> {
    let value = get_env(key)?;
    parse_bool(key, &value)
}

/// Get a boolean environment variable, falling back to `default` when unset.
///
/// A set but malformed value is still an error.
pub fn get_env_bool_or(key: &str, default: bool) -> Result<bool> {
    if std::env::var_os(key).is_none() {
        return Ok(default);
    }
    get_env_bool(key)
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(StoreError::config(format!(
            "Invalid boolean value for '{}': {}",
            key, value
        ))),
    }
}

/// Load configuration from a YAML file.
pub fn load_yaml_config<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let content = std::fs::read_to_string(path.as_ref())?;
    Ok(serde_yaml::from_str(&content)?)
}

/// Load configuration from a JSON file.
pub fn load_json_config<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let content = std::fs::read_to_string(path.as_ref())?;
    Ok(serde_json::from_str(&content)?)
}

/// Load configuration from a file (format picked from the extension).
pub fn load_config_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| {
            StoreError::config(format!("Unable to determine file extension for {:?}", path))
        })?;

    match extension.to_lowercase().as_str() {
        "yaml" | "yml" => load_yaml_config(path),
        "json" => load_json_config(path),
        _ => Err(StoreError::config(format!(
            "Unsupported config file extension: {}",
            extension
        ))),
    }
}

/// Types that can be loaded from environment variables.
pub trait FromEnv: Sized {
    /// Load configuration from environment variables with the given prefix.
    fn from_env(prefix: &str) -> Result<Self>;
}

/// Configuration validation.
pub trait ValidateConfig {
    fn validate(&self) -> Result<()>;
}

/// Settings for the store task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Label attached to the store task's tracing span
    pub name: String,

    /// Emit a debug event for every applied transition
    pub log_transitions: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "async-store".to_string(),
            log_transitions: true,
        }
    }
}

impl StoreConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_log_transitions(mut self, enabled: bool) -> Self {
        self.log_transitions = enabled;
        self
    }
}

impl FromEnv for StoreConfig {
    /// Reads `{prefix}_NAME` and `{prefix}_LOG_TRANSITIONS`.
    fn from_env(prefix: &str) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            name: get_env_or(&format!("{}_NAME", prefix), &defaults.name),
            log_transitions: get_env_bool_or(
                &format!("{}_LOG_TRANSITIONS", prefix),
                defaults.log_transitions,
            )?,
        };
        config.validate()?;
        Ok(config)
    }
}

impl ValidateConfig for StoreConfig {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(StoreError::config("store name cannot be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = StoreConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.log_transitions);
    }

    #[test]
    fn test_empty_name_rejected() {
        let config = StoreConfig::default().with_name("  ");
        assert!(matches!(config.validate(), Err(StoreError::Config(_))));
    }

    #[test]
    fn test_from_env_reads_prefixed_vars() {
        std::env::set_var("TEST_STORE_CFG_NAME", "ui-store");
        std::env::set_var("TEST_STORE_CFG_LOG_TRANSITIONS", "off");

        let config = StoreConfig::from_env("TEST_STORE_CFG").unwrap();
        assert_eq!(config.name, "ui-store");
        assert!(!config.log_transitions);

        std::env::set_var("TEST_STORE_CFG_LOG_TRANSITIONS", "maybe");
        assert!(StoreConfig::from_env("TEST_STORE_CFG").is_err());
    }

    #[test]
    fn test_from_env_falls_back_to_defaults() {
        let config = StoreConfig::from_env("TEST_STORE_CFG_UNSET").unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn test_env_bool_helpers() {
        assert!(get_env_bool("TEST_STORE_BOOL_UNSET").is_err());
        assert!(get_env_bool_or("TEST_STORE_BOOL_UNSET", true).unwrap());

        std::env::set_var("TEST_STORE_BOOL_SET", "Yes");
        assert!(get_env_bool("TEST_STORE_BOOL_SET").unwrap());
        assert!(get_env_bool_or("TEST_STORE_BOOL_SET", false).unwrap());

        std::env::set_var("TEST_STORE_BOOL_SET", "nope");
        assert!(matches!(
            get_env_bool_or("TEST_STORE_BOOL_SET", true),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn test_load_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "name: worker-store\nlog_transitions: false").unwrap();

        let config: StoreConfig = load_config_file(file.path()).unwrap();
        assert_eq!(config.name, "worker-store");
        assert!(!config.log_transitions);
    }

    #[test]
    fn test_load_json_file_with_defaults() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        writeln!(file, r#"{{"name": "json-store"}}"#).unwrap();

        let config: StoreConfig = load_config_file(file.path()).unwrap();
        assert_eq!(config.name, "json-store");
        assert!(config.log_transitions);
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let result: Result<StoreConfig> = load_config_file(file.path());
        assert!(matches!(result, Err(StoreError::Config(_))));
    }
}
