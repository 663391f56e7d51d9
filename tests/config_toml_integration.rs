use std::time::Duration;
use taskmind::cli::{AppConfig, ConfigDiscovery, ConfigError};
use tempfile::NamedTempFile;

#[test]
fn test_config_file_operations() {
    let mut original_config = AppConfig::default();
    original_config.service.pool.pool_size = 8;
    original_config.service.retry.contention_backoff = Duration::from_millis(250);
    original_config.backend.exclusive_space = true;

    let temp_file = NamedTempFile::new().expect("Should be able to create temporary file");
    let temp_path = temp_file.path();

    original_config
        .to_toml_file(temp_path)
        .expect("Should be able to save config to file");

    let loaded_config =
        AppConfig::from_toml_file(temp_path).expect("Should be able to load config from file");
    assert_eq!(loaded_config, original_config);

    let discovered = ConfigDiscovery::load(Some(temp_path)).expect("Override should load");
    assert_eq!(discovered.service.pool.pool_size, 8);
}

#[test]
fn test_config_toml_structure() {
    let toml_str = toml::to_string_pretty(&AppConfig::default())
        .expect("Should be able to serialize config");

    assert!(toml_str.contains("[service.pool]"), "Should contain pool section");
    assert!(toml_str.contains("[service.retry]"), "Should contain retry section");
    assert!(toml_str.contains("[service.monitor]"), "Should contain monitor section");
    assert!(toml_str.contains("[service.scoring]"), "Should contain scoring section");
    assert!(toml_str.contains("[backend]"), "Should contain backend section");
    assert!(toml_str.contains("enable_fallback = true"));
}

#[test]
fn test_minimal_config_uses_defaults() {
    let temp_file = NamedTempFile::new().unwrap();
    std::fs::write(temp_file.path(), "[service]\nenable_fallback = false\n").unwrap();

    let config = AppConfig::from_toml_file(temp_file.path()).unwrap();
    assert!(!config.service.enable_fallback);
    assert_eq!(config.service.pool.pool_size, 3);
    assert_eq!(config.service.monitor.max_history, 1000);
    assert!(!config.backend.is_enabled());
}

#[test]
fn test_config_error_handling() {
    let temp_file = NamedTempFile::new().unwrap();
    std::fs::write(temp_file.path(), "[service\npool_size = ").unwrap();

    let result = AppConfig::from_toml_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::Parse(_))));

    let missing = AppConfig::from_toml_file("/nonexistent/taskmind.toml");
    assert!(matches!(missing, Err(ConfigError::Io(_))));
}
