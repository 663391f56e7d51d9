//! Environment constants and path utilities for taskmind.
//!
//! This module centralizes the directory and file names used for
//! configuration discovery and diagnostics output.

use std::path::{Path, PathBuf};

/// Main application directory name (hidden directory like .git, .vscode)
pub const TASKMIND_DIR_NAME: &str = ".taskmind";

/// Configuration file name inside the application directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Stand-alone configuration file name in the current directory
pub const LOCAL_CONFIG_FILE_NAME: &str = "taskmind.toml";

/// System-wide configuration file (Unix-like systems)
pub const SYSTEM_CONFIG_PATH: &str = "/etc/taskmind/config.toml";

/// Diagnostics-related names
pub mod diagnostics {
    /// Diagnostics directory name within .taskmind
    pub const DIAGNOSTICS_DIR_NAME: &str = "diagnostics";

    /// Default diagnostics export file name
    pub const DIAGNOSTICS_FILE_NAME: &str = "diagnostics.json.gz";
}

/// Build the main .taskmind directory path from a workspace root
pub fn taskmind_dir_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(TASKMIND_DIR_NAME)
}

/// Build the default diagnostics export path from a workspace root
pub fn diagnostics_file_path(workspace_root: &Path) -> PathBuf {
    taskmind_dir_path(workspace_root)
        .join(diagnostics::DIAGNOSTICS_DIR_NAME)
        .join(diagnostics::DIAGNOSTICS_FILE_NAME)
}

/// Build config directory path in user's home directory
pub fn user_config_dir_path(home_dir: &Path) -> PathBuf {
    home_dir.join(TASKMIND_DIR_NAME)
}

/// Build config file path in user's home directory
pub fn user_config_file_path(home_dir: &Path) -> PathBuf {
    user_config_dir_path(home_dir).join(CONFIG_FILE_NAME)
}

/// Build local config file path in current directory
pub fn local_config_file_path(current_dir: &Path) -> PathBuf {
    current_dir.join(TASKMIND_DIR_NAME).join(CONFIG_FILE_NAME)
}
