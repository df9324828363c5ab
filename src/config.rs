// DriveKit Configuration Module
// Persistent client configuration storage

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::transfer::{TransferPolicy, DIRECT_DOWNLOAD_MAX_SIZE, DIRECT_UPLOAD_MAX_SIZE};

/// Environment variable holding the access token; never persisted
pub const ACCESS_TOKEN_ENV: &str = "DRIVEKIT_ACCESS_TOKEN";

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveKitConfig {
    /// Account the static token belongs to
    #[serde(default = "default_union_id")]
    pub union_id: String,
    /// Root directory served by the local drive backend
    #[serde(default = "default_drive_root")]
    pub drive_root: PathBuf,
    /// Where downloads are written
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: PathBuf,
    /// Staging area for picked files, wiped on exit
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// App-private files, wiped on exit
    #[serde(default = "default_files_dir")]
    pub files_dir: PathBuf,
    #[serde(default = "default_direct_upload_max_size")]
    pub direct_upload_max_size: u64,
    #[serde(default = "default_direct_download_max_size")]
    pub direct_download_max_size: u64,
    /// tracing filter level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_union_id() -> String {
    "local".to_string()
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("drivekit")
}

fn default_drive_root() -> PathBuf {
    data_dir().join("drive")
}

fn default_downloads_dir() -> PathBuf {
    crate::storage::DownloadsFolder::platform_default()
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("drivekit")
}

fn default_files_dir() -> PathBuf {
    data_dir().join("files")
}

fn default_direct_upload_max_size() -> u64 {
    DIRECT_UPLOAD_MAX_SIZE
}

fn default_direct_download_max_size() -> u64 {
    DIRECT_DOWNLOAD_MAX_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DriveKitConfig {
    fn default() -> Self {
        Self {
            union_id: default_union_id(),
            drive_root: default_drive_root(),
            downloads_dir: default_downloads_dir(),
            cache_dir: default_cache_dir(),
            files_dir: default_files_dir(),
            direct_upload_max_size: default_direct_upload_max_size(),
            direct_download_max_size: default_direct_download_max_size(),
            log_level: default_log_level(),
        }
    }
}

impl DriveKitConfig {
    pub fn transfer_policy(&self) -> TransferPolicy {
        TransferPolicy {
            direct_upload_max_size: self.direct_upload_max_size,
            direct_download_max_size: self.direct_download_max_size,
        }
    }
}

/// Access token from the environment, if set and non-empty
pub fn access_token_from_env() -> Option<SecretString> {
    std::env::var(ACCESS_TOKEN_ENV)
        .ok()
        .filter(|t| !t.trim().is_empty())
        .map(SecretString::from)
}

/// Get the path to the config file
pub fn get_config_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")));
    config_dir.join("drivekit").join("config.json")
}

/// Load configuration from the default location
pub fn load_config() -> DriveKitConfig {
    load_config_from(&get_config_path())
}

/// Load configuration from `path`, falling back to defaults when it is
/// missing or unreadable
pub fn load_config_from(path: &Path) -> DriveKitConfig {
    if path.exists() {
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => return config,
                Err(e) => tracing::warn!("Failed to parse config {:?}: {}", path, e),
            },
            Err(e) => tracing::warn!("Failed to read config {:?}: {}", path, e),
        }
    }
    DriveKitConfig::default()
}

/// Save configuration to the default location
pub fn save_config(config: &DriveKitConfig) -> Result<(), String> {
    save_config_to(config, &get_config_path())
}

pub fn save_config_to(config: &DriveKitConfig, path: &Path) -> Result<(), String> {
    validate_config(config)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    fs::write(path, content).map_err(|e| format!("Failed to write config: {}", e))?;

    tracing::info!("Config saved to {:?}", path);
    Ok(())
}

/// Reject configurations that cannot work
pub fn validate_config(config: &DriveKitConfig) -> Result<(), String> {
    if config.union_id.trim().is_empty() {
        return Err("union_id must not be empty".to_string());
    }
    if config.direct_upload_max_size == 0 || config.direct_download_max_size == 0 {
        return Err("direct transfer thresholds must be positive".to_string());
    }
    if config.cache_dir == config.files_dir {
        return Err("cache_dir and files_dir must differ".to_string());
    }
    for (name, dir) in [("cache_dir", &config.cache_dir), ("files_dir", &config.files_dir)] {
        // both are purged recursively on exit
        if dir.parent().is_none() || dir.as_os_str().is_empty() {
            return Err(format!("{} must not be a filesystem root", name));
        }
        if dirs::home_dir().as_deref() == Some(dir.as_path()) {
            return Err(format!("{} must not be the home directory", name));
        }
    }
    match config.log_level.to_ascii_lowercase().as_str() {
        "error" | "warn" | "info" | "debug" | "trace" => Ok(()),
        other => Err(format!("Unknown log level: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(dir: &Path) -> DriveKitConfig {
        DriveKitConfig {
            drive_root: dir.join("drive"),
            downloads_dir: dir.join("downloads"),
            cache_dir: dir.join("cache"),
            files_dir: dir.join("files"),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = DriveKitConfig::default();
        assert_eq!(config.direct_upload_max_size, 5_000_000);
        assert_eq!(config.direct_download_max_size, 20_000_000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.transfer_policy(), TransferPolicy::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = sample(dir.path());
        config.union_id = "user-7".to_string();
        config.direct_upload_max_size = 1024;

        save_config_to(&config, &path).unwrap();
        assert_eq!(load_config_from(&path), config);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"union_id": "abc", "log_level": "debug"}"#).unwrap();

        let config = load_config_from(&path);
        assert_eq!(config.union_id, "abc");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.direct_download_max_size, DIRECT_DOWNLOAD_MAX_SIZE);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_config_from(&path).union_id, "local");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let good = sample(dir.path());
        assert!(validate_config(&good).is_ok());

        let mut bad = good.clone();
        bad.direct_upload_max_size = 0;
        assert!(validate_config(&bad).is_err());

        let mut bad = good.clone();
        bad.files_dir = bad.cache_dir.clone();
        assert!(validate_config(&bad).is_err());

        let mut bad = good.clone();
        bad.cache_dir = PathBuf::from("/");
        assert!(validate_config(&bad).is_err());

        let mut bad = good;
        bad.log_level = "loud".to_string();
        assert!(validate_config(&bad).is_err());
    }

    #[test]
    fn test_invalid_config_is_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = sample(dir.path());
        config.union_id = String::new();
        assert!(save_config_to(&config, &path).is_err());
        assert!(!path.exists());
    }
}
