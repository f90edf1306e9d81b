//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles YAML file discovery,
//! environment detection, override merging and environment variable
//! expansion.

use super::error::{ConfigResult, ConfigurationError};
use super::AnalyticsConfig;
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Configuration file names searched for, in order
const CONFIG_FILE_NAMES: [&str; 2] = ["analytics-config.yaml", "analytics-config.yml"];

/// Environments whose override sections are stripped from the base document
const KNOWN_ENVIRONMENTS: [&str; 3] = ["development", "test", "production"];

/// Loaded configuration with the environment and directory it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: AnalyticsConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<ConfigManager> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<ConfigManager> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for testing without modifying global environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<ConfigManager> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let mut config = Self::load_and_merge_config(&config_directory, environment)?;
        Self::apply_environment_variables(&mut config)?;
        config.validate()?;

        info!(
            environment = %environment,
            source_table = %config.source.table,
            batch_size = config.aggregation.batch_size,
            "Configuration loaded successfully"
        );

        Ok(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        })
    }

    /// Like [`ConfigManager::load_from_directory_with_env`], but falls back to
    /// defaults when no configuration file exists
    pub fn load_or_default(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<ConfigManager> {
        match Self::load_from_directory_with_env(config_dir.clone(), environment) {
            Err(ConfigurationError::ConfigFileNotFound { searched_paths }) => {
                warn!(
                    searched = ?searched_paths,
                    "No configuration file found, using defaults"
                );
                let mut config = AnalyticsConfig::default();
                Self::apply_environment_variables(&mut config)?;
                config.validate()?;
                Ok(ConfigManager {
                    config,
                    environment: environment.to_string(),
                    config_directory: config_dir.unwrap_or_else(Self::default_config_directory),
                })
            }
            other => other,
        }
    }

    /// Wrap an already built configuration
    pub fn from_config(config: AnalyticsConfig, environment: &str) -> ConfigResult<ConfigManager> {
        config.validate()?;
        Ok(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from("config"),
        })
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Get the configuration directory
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Configuration as JSON with sensitive fields masked
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    /// Detect current environment from environment variables
    pub fn detect_environment() -> String {
        env::var("ANALYTICS_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn default_config_directory() -> PathBuf {
        let possible_dirs = [PathBuf::from("config"), PathBuf::from("../config")];

        for dir in possible_dirs {
            if CONFIG_FILE_NAMES.iter().any(|name| dir.join(name).exists()) {
                debug!("Found config directory: {}", dir.display());
                return dir;
            }
        }

        PathBuf::from("config")
    }

    /// Find the configuration file
    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let mut searched_paths = Vec::new();

        for name in CONFIG_FILE_NAMES {
            let config_path = config_directory.join(name);
            searched_paths.push(config_path.clone());

            if config_path.is_file() {
                debug!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        Err(ConfigurationError::config_file_not_found(searched_paths))
    }

    /// Load and merge configuration with environment-specific overrides
    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
    ) -> ConfigResult<AnalyticsConfig> {
        let config_file = Self::find_config_file(config_directory)?;

        let yaml_content = std::fs::read_to_string(&config_file)
            .map_err(|e| ConfigurationError::file_read_error(config_file.display().to_string(), e))?;

        let mut yaml_data: YamlValue = serde_yaml::from_str(&yaml_content)
            .map_err(|e| ConfigurationError::invalid_yaml(config_file.display().to_string(), e))?;

        if yaml_data.is_null() {
            yaml_data = YamlValue::Mapping(Default::default());
        }

        let overrides = yaml_data
            .get(YamlValue::String(environment.to_string()))
            .cloned();

        // Environment sections are not part of the configuration structure
        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for name in KNOWN_ENVIRONMENTS
                .iter()
                .copied()
                .chain(std::iter::once(environment))
            {
                map.remove(YamlValue::String(name.to_string()));
            }
        }

        if let Some(env_overrides) = overrides {
            debug!(
                "Applying environment-specific overrides for: {}",
                environment
            );
            Self::merge_yaml_values(&mut yaml_data, env_overrides)?;
        }

        serde_yaml::from_value(yaml_data).map_err(|e| {
            ConfigurationError::invalid_yaml(
                config_file.display().to_string(),
                format!("Failed to deserialize configuration: {e}"),
            )
        })
    }

    /// Recursively merge YAML values (environment overrides into base config)
    fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) -> ConfigResult<()> {
        match (&mut *base, override_value) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
                for (key, value) in override_map {
                    if let Some(existing_value) = base_map.get_mut(&key) {
                        Self::merge_yaml_values(existing_value, value)?;
                    } else {
                        base_map.insert(key, value);
                    }
                }
            }
            (YamlValue::Mapping(_), other) if !other.is_mapping() && !other.is_null() => {
                return Err(ConfigurationError::config_merge_error(
                    "environment override must be a mapping",
                ));
            }
            (base_ref, override_val) => {
                *base_ref = override_val;
            }
        }
        Ok(())
    }

    /// Expand `${VAR}` references and apply `DATABASE_URL`
    fn apply_environment_variables(config: &mut AnalyticsConfig) -> ConfigResult<()> {
        if let Some(url) = config.database.url.as_mut() {
            *url = Self::expand_variable(url)?;
        }
        config.database.password = Self::expand_variable(&config.database.password)?;

        if let Ok(database_url) = env::var("DATABASE_URL") {
            if !database_url.is_empty() {
                debug!("Using DATABASE_URL from the environment");
                config.database.url = Some(database_url);
            }
        }
        Ok(())
    }

    /// Replace a whole-value `${VAR}` with the variable's value
    fn expand_variable(value: &str) -> ConfigResult<String> {
        let trimmed = value.trim();
        match trimmed
            .strip_prefix("${")
            .and_then(|rest| rest.strip_suffix('}'))
        {
            Some(var_name) => env::var(var_name).map_err(|_| {
                ConfigurationError::environment_variable_error(var_name, "variable is not set")
            }),
            None => Ok(value.to_string()),
        }
    }

    /// Sanitize configuration for safe logging by masking sensitive fields
    fn sanitize_config_for_logging(config: &AnalyticsConfig) -> serde_json::Value {
        let mut config_json = serde_json::json!(config);
        let sensitive_patterns = ["password", "secret", "token", "credential"];
        Self::sanitize_json_recursive(&mut config_json, &sensitive_patterns);

        // Connection URLs embed credentials
        if let Some(url) = config_json.pointer_mut("/database/url") {
            if let Some(s) = url.as_str() {
                *url = serde_json::Value::String(Self::mask_url_credentials(s));
            }
        }
        config_json
    }

    fn mask_url_credentials(url: &str) -> String {
        match (url.find("://"), url.rfind('@')) {
            (Some(scheme_end), Some(at)) if at > scheme_end => {
                format!("{}://[MASKED]{}", &url[..scheme_end], &url[at..])
            }
            _ => url.to_string(),
        }
    }

    /// Recursively sanitize sensitive fields in JSON configuration
    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    let is_sensitive = sensitive_patterns
                        .iter()
                        .any(|pattern| key_lower.contains(pattern));

                    if is_sensitive {
                        *val = match val {
                            serde_json::Value::String(s) if s.is_empty() => {
                                serde_json::Value::String("[EMPTY]".to_string())
                            }
                            _ => serde_json::Value::String("[MASKED]".to_string()),
                        };
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(arr) => {
                for item in arr.iter_mut() {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }
}
