//! User configuration, loaded from `~/.lineage-research/config.json` and
//! deep-merged over in-code defaults. A missing file is not an error; a
//! malformed one logs a warning and falls back to defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub chrome: ChromeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// "embedded" (SQLite file) or "networked" (Postgres).
    #[serde(rename = "type")]
    pub db_type: String,
    pub sqlite_path: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub endpoint: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromeConfig {
    pub debug_host: String,
    pub debug_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            api: ApiConfig::default(),
            chrome: ChromeConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: "embedded".to_string(),
            sqlite_path: config_dir().join("lineage.db").to_string_lossy().into_owned(),
            host: "localhost".to_string(),
            port: 5432,
            database: "lineage".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { endpoint: String::new(), key: String::new() }
    }
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self { debug_host: "127.0.0.1".to_string(), debug_port: 9222 }
    }
}

impl DatabaseConfig {
    pub fn is_networked(&self) -> bool {
        // Accept the Postgres spelling too; older config files used it.
        self.db_type == "networked" || self.db_type == "postgresql"
    }
}

impl ApiConfig {
    /// Roster actions are unavailable until both endpoint and key are set.
    pub fn is_configured(&self) -> bool {
        !self.endpoint.is_empty() && !self.key.is_empty()
    }
}

impl Config {
    /// Load the user config file, merging it over defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file())
    }

    pub fn load_from(path: &PathBuf) -> Self {
        let defaults = serde_json::to_value(Config::default())
            .unwrap_or(Value::Object(Default::default()));

        let raw = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(_) => return Config::default(),
        };

        let user: Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Malformed config file, using defaults");
                return Config::default();
            }
        };

        let merged = deep_merge(defaults, user);
        match serde_json::from_value(merged) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unusable config values, using defaults");
                Config::default()
            }
        }
    }

    /// Write `config.example.json` beside the real config path.
    pub fn write_example() -> std::io::Result<PathBuf> {
        let dir = config_dir();
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("config.example.json");
        let example = serde_json::json!({
            "database": {
                "type": "networked",
                "host": "localhost",
                "port": 5432,
                "database": "lineage",
                "user": "postgres",
                "password": "your_password_here"
            },
            "api": {
                "endpoint": "https://your-kindred-instance.example/api/graphql",
                "key": "your_api_key_here"
            },
            "chrome": {
                "debug_host": "127.0.0.1",
                "debug_port": 9222
            }
        });
        std::fs::write(&path, serde_json::to_string_pretty(&example)?)?;
        Ok(path)
    }

    /// Log where data lives without echoing credentials.
    pub fn log_redacted(&self) {
        if self.database.is_networked() {
            tracing::info!(
                host = self.database.host.as_str(),
                port = self.database.port,
                database = self.database.database.as_str(),
                "Database: networked"
            );
        } else {
            tracing::info!(path = self.database.sqlite_path.as_str(), "Database: embedded");
        }
        if self.api.is_configured() {
            tracing::info!(endpoint = self.api.endpoint.as_str(), key_chars = self.api.key.len(), "Roster API configured");
        } else {
            tracing::info!("Roster API not configured");
        }
    }
}

/// Per-user data/config directory.
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".lineage-research")
}

pub fn config_file() -> PathBuf {
    config_dir().join("config.json")
}

/// Recursive merge: `override_` wins, objects merge key-by-key.
fn deep_merge(base: Value, override_: Value) -> Value {
    match (base, override_) {
        (Value::Object(mut base_map), Value::Object(override_map)) => {
            for (key, value) in override_map {
                let merged = match base_map.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, override_) => override_,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_merge_overrides_nested_keys() {
        let base = serde_json::json!({"database": {"type": "embedded", "port": 5432}, "api": {"key": ""}});
        let user = serde_json::json!({"database": {"type": "networked"}});
        let merged = deep_merge(base, user);
        assert_eq!(merged["database"]["type"], "networked");
        assert_eq!(merged["database"]["port"], 5432);
        assert_eq!(merged["api"]["key"], "");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = Config::load_from(&PathBuf::from("/nonexistent/config.json"));
        assert_eq!(cfg.database.db_type, "embedded");
        assert_eq!(cfg.chrome.debug_port, 9222);
        assert!(!cfg.api.is_configured());
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let dir = std::env::temp_dir().join(format!("lineage-cfg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, r#"{"api": {"endpoint": "https://x.example", "key": "k"}}"#).unwrap();
        let cfg = Config::load_from(&path);
        assert!(cfg.api.is_configured());
        assert_eq!(cfg.database.db_type, "embedded");
        std::fs::remove_dir_all(&dir).ok();
    }
}
