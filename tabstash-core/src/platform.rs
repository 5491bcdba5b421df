//! Platform-specific paths for the local store and configuration

use std::path::PathBuf;

const APP_DIR: &str = "TabStash";

/// Get the platform-specific data directory for the local store
///
/// Returns:
/// - Windows: %LOCALAPPDATA%\TabStash
/// - macOS: ~/Library/Application Support/TabStash
/// - Linux/Other: ~/.local/share/TabStash
pub fn get_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".data")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join(APP_DIR)
}

/// Get the platform-specific config directory
///
/// Returns:
/// - Windows: %APPDATA%\TabStash
/// - macOS: ~/Library/Application Support/TabStash
/// - Linux/Other: ~/.config/TabStash
pub fn get_config_dir() -> PathBuf {
    let base = dirs::config_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join(APP_DIR)
}

/// Get the default SQLite store path
pub fn get_default_store_path() -> PathBuf {
    get_data_dir().join("tabstash.db")
}

/// Get the default sync configuration file path
pub fn get_config_path() -> PathBuf {
    get_config_dir().join("config.toml")
}

/// Ensure the data directory exists, creating it if necessary
pub fn ensure_data_dir() -> std::io::Result<PathBuf> {
    let dir = get_data_dir();
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Get current platform as a string. Reported as the device platform.
pub fn get_platform() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "macos"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else {
        "unknown"
    }
}
