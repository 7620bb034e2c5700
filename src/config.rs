use crate::connection::config::ShardClusterConfig;
use crate::core::{Result, ShardError};
use crate::kv::config::RedisConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything a process needs to reach its shards and its lock store.
///
/// ```json
/// {
///   "shards": {
///     "worker_id": 1,
///     "type": "mysql",
///     "user": "app",
///     "password": "secret",
///     "hosts": { "0": "10.0.0.1:3306", "1": "10.0.0.2:3306" },
///     "name": "users",
///     "max_idle": 10,
///     "max_open": 20,
///     "max_lifetime_secs": 1800
///   },
///   "kv": {
///     "host": "10.0.0.9:6379",
///     "max_idle": 30,
///     "max_active": 30,
///     "idle_timeout_secs": 200
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    pub shards: ShardClusterConfig,
    pub kv: RedisConfig,
}

impl Settings {
    pub fn new(shards: ShardClusterConfig, kv: RedisConfig) -> Self {
        Self { shards, kv }
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ShardError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        self.shards.validate()?;
        self.kv.validate()
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "shards": {
            "worker_id": 3,
            "type": "mysql",
            "user": "app",
            "password": "secret",
            "hosts": { "0": "127.0.0.1:3306", "1": "127.0.0.1:3307" },
            "name": "users",
            "max_idle": 5,
            "max_open": 20,
            "max_lifetime_secs": 600
        },
        "kv": {
            "host": "127.0.0.1:6379",
            "max_idle": 30,
            "max_active": 30,
            "idle_timeout_secs": 200
        }
    }"#;

    #[test]
    fn test_parse_sample() {
        let settings = Settings::from_json_str(SAMPLE).unwrap();
        assert_eq!(settings.shards.worker_id, 3);
        assert_eq!(settings.shards.shard_count(), 2);
        assert_eq!(settings.shards.fingerprint_digits, 32);
        assert_eq!(settings.kv.password, "");
        assert_eq!(settings.kv.connect_timeout_secs, 5);
    }

    #[test]
    fn test_invalid_document_is_config_error() {
        assert!(matches!(
            Settings::from_json_str("{ not json"),
            Err(ShardError::Config(_))
        ));
    }

    #[test]
    fn test_validation_runs_on_load() {
        let broken = SAMPLE.replace("\"mysql\"", "\"oracle\"");
        assert!(matches!(
            Settings::from_json_str(&broken),
            Err(ShardError::Config(_))
        ));

        let gap = SAMPLE.replace("\"1\": \"127.0.0.1:3307\"", "\"2\": \"127.0.0.1:3307\"");
        assert!(Settings::from_json_str(&gap).is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.kv.host, "127.0.0.1:6379");

        assert!(Settings::from_file("/definitely/not/here.json").is_err());
    }

    #[test]
    fn test_pretty_output_reloads() {
        let settings = Settings::from_json_str(SAMPLE).unwrap();
        let json = settings.to_json_pretty().unwrap();
        assert_eq!(Settings::from_json_str(&json).unwrap(), settings);
    }
}
