//! Configuration discovery and loading
//!
//! This module handles the configuration discovery hierarchy:
//! 1. Current directory: ./taskmind.toml or ./.taskmind/config.toml
//! 2. User config: ~/.taskmind/config.toml
//! 3. System config: /etc/taskmind/config.toml
//! 4. Built-in defaults

use crate::backend::FaultProfile;
use crate::env;
use crate::service::SchedulerServiceConfig;
use serde::{Deserialize, Serialize};
use std::env as std_env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Could not determine home directory")]
    NoHomeDir,
}

/// Top-level configuration file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub service: SchedulerServiceConfig,
    /// Fault injection for the in-process backend
    pub backend: FaultProfile,
}

impl AppConfig {
    /// Load from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save to TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Configuration discovery system
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Load the override if given, otherwise discover configuration using the hierarchy
    pub fn load(config_override: Option<&Path>) -> Result<AppConfig, ConfigError> {
        match config_override {
            Some(path) => {
                info!("Loading configuration override from: {:?}", path);
                AppConfig::from_toml_file(path)
            }
            None => Self::discover_config(),
        }
    }

    /// Discover and load configuration using the hierarchy
    pub fn discover_config() -> Result<AppConfig, ConfigError> {
        if let Some(config_path) = Self::find_config_file() {
            info!("Loading configuration from: {:?}", config_path);
            return AppConfig::from_toml_file(config_path);
        }

        debug!("No configuration file found, using defaults");
        Ok(AppConfig::default())
    }

    /// Find configuration file using discovery hierarchy
    pub fn find_config_file() -> Option<PathBuf> {
        for candidate in Self::get_config_candidates() {
            debug!("Checking for config file: {:?}", candidate);
            if candidate.is_file() {
                debug!("Found config file: {:?}", candidate);
                return Some(candidate);
            }
        }

        debug!("No config file found in discovery hierarchy");
        None
    }

    /// Get list of configuration file candidates in priority order
    fn get_config_candidates() -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Ok(current_dir) = std_env::current_dir() {
            candidates.push(current_dir.join(env::LOCAL_CONFIG_FILE_NAME));
            candidates.push(env::local_config_file_path(&current_dir));
        }

        if let Some(home_dir) = Self::get_home_dir() {
            candidates.push(env::user_config_file_path(&home_dir));
        }

        #[cfg(unix)]
        candidates.push(PathBuf::from(env::SYSTEM_CONFIG_PATH));

        #[cfg(windows)]
        if let Ok(program_data) = std_env::var("PROGRAMDATA") {
            candidates.push(
                PathBuf::from(program_data)
                    .join("taskmind")
                    .join(env::CONFIG_FILE_NAME),
            );
        }

        candidates
    }

    fn get_home_dir() -> Option<PathBuf> {
        std_env::var("HOME")
            .ok()
            .or_else(|| std_env::var("USERPROFILE").ok())
            .map(PathBuf::from)
    }

    /// Create a default config file in the user's home directory
    pub fn create_default_user_config() -> Result<PathBuf, ConfigError> {
        let home_dir = Self::get_home_dir().ok_or(ConfigError::NoHomeDir)?;
        Self::create_default_config_in(&home_dir)
    }

    fn create_default_config_in(home_dir: &Path) -> Result<PathBuf, ConfigError> {
        let config_dir = env::user_config_dir_path(home_dir);
        let config_path = env::user_config_file_path(home_dir);

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)?;
            info!("Created configuration directory: {:?}", config_dir);
        }

        if !config_path.exists() {
            AppConfig::default().to_toml_file(&config_path)?;
            info!("Created default configuration file: {:?}", config_path);
        } else {
            warn!("Configuration file already exists: {:?}", config_path);
        }

        Ok(config_path)
    }

    /// Show configuration discovery information for debugging
    pub fn show_discovery_info() {
        println!("Configuration Discovery Hierarchy:");
        println!();

        for (i, candidate) in Self::get_config_candidates().iter().enumerate() {
            let status = if candidate.exists() {
                if candidate.is_file() {
                    "EXISTS"
                } else {
                    "NOT A FILE"
                }
            } else {
                "NOT FOUND"
            };

            println!("  {}. {:?} - {}", i + 1, candidate, status);
        }

        println!();
        if let Some(found) = Self::find_config_file() {
            println!("Active configuration: {:?}", found);
        } else {
            println!("Active configuration: Built-in defaults");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: AppConfig = toml::from_str(&toml_string).unwrap();
        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [service]
            enable_fallback = false

            [service.pool]
            pool_size = 5

            [backend]
            contention_rate = 0.25
            "#,
        )
        .unwrap();

        assert!(!config.service.enable_fallback);
        assert_eq!(config.service.pool.pool_size, 5);
        assert_eq!(config.service.pool.staleness_threshold, Duration::from_secs(30));
        assert_eq!(config.service.retry.max_retries, 3);
        assert_eq!(config.service.scoring.high_priority_weight, 3.0);
        assert_eq!(config.backend.contention_rate, 0.25);
        assert!(!config.backend.exclusive_space);
    }

    #[test]
    fn test_config_file_operations() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test_config.toml");

        let mut original_config = AppConfig::default();
        original_config.service.monitor.max_history = 50;
        original_config.to_toml_file(&config_path).unwrap();
        assert!(config_path.exists());

        let loaded_config = AppConfig::from_toml_file(&config_path).unwrap();
        assert_eq!(loaded_config.service.monitor.max_history, 50);
        assert_eq!(loaded_config, original_config);

        let loaded = ConfigDiscovery::load(Some(&config_path)).unwrap();
        assert_eq!(loaded, original_config);
    }

    #[test]
    fn test_create_default_config() {
        let home = TempDir::new().unwrap();
        let path = ConfigDiscovery::create_default_config_in(home.path()).unwrap();
        assert_eq!(path, home.path().join(".taskmind").join("config.toml"));
        assert_eq!(AppConfig::from_toml_file(&path).unwrap(), AppConfig::default());

        // A second call leaves the existing file alone
        assert_eq!(ConfigDiscovery::create_default_config_in(home.path()).unwrap(), path);
    }

    #[test]
    fn test_config_candidates() {
        let candidates = ConfigDiscovery::get_config_candidates();

        assert!(!candidates.is_empty());
        assert!(candidates[0].file_name().unwrap() == "taskmind.toml");
    }
}
