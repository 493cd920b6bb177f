use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// WebSocket URL of the fan-out relay.
    #[serde(default = "default_relay_url")]
    pub relay_url: String,
    /// Base URL of the REST persistence gateway.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    /// User id this client joins as.
    #[serde(default)]
    pub user: String,
}

fn default_relay_url() -> String {
    "ws://127.0.0.1:4880/".to_string()
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:4800".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            gateway_url: default_gateway_url(),
            user: String::new(),
        }
    }
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}

pub fn save_config(path: &str, config: &AppConfig) -> std::io::Result<()> {
    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        let config = load_config(path.to_str().unwrap());
        assert_eq!(config, AppConfig::default());
        assert!(config.user.is_empty());
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/chatwire.json");
        let path = path.to_str().unwrap();

        let config = AppConfig {
            relay_url: "ws://relay.example:9000/".to_string(),
            gateway_url: "http://api.example".to_string(),
            user: "alice".to_string(),
        };
        save_config(path, &config).unwrap();
        assert_eq!(load_config(path), config);
    }

    #[test]
    fn partial_files_keep_missing_fields_at_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        fs::write(&path, r#"{"user": "bob"}"#).unwrap();

        let config = load_config(path.to_str().unwrap());
        assert_eq!(config.user, "bob");
        assert_eq!(config.relay_url, default_relay_url());
    }
}
