use serde::Deserialize;
use std::{path::Path, time::Duration};
use thiserror::Error;

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Interface the listener binds to.
    pub host: String,
    /// Maximum number of pending connections in the listen queue.
    pub backlog: i32,
    /// Timeout waiting for the client to send the request (in
    /// milliseconds).
    pub read_timeout: u32,
    /// Timeout writing the response to the client (in milliseconds).
    pub write_timeout: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "0.0.0.0".to_string(),
            backlog: 10,
            read_timeout: 5000,
            write_timeout: 5000,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read configuration file {path}. {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Unable to parse configuration file {path}. {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("Invalid configuration file {path}. {reason}")]
    Invalid { path: String, reason: String },
}

impl Config {
    /// Reads the configuration from a TOML file, or returns the defaults
    /// when no file is given. Missing keys keep their default value.
    pub async fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let Some(path) = path else {
            return Ok(Config::default());
        };
        let display = path.display().to_string();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: display.clone(),
                source,
            })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout as u64)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn loading_without_file_uses_defaults() {
        let config = Config::load(None).await.unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.backlog, 10);
        assert_eq!(config.host, "0.0.0.0");
    }

    #[tokio::test]
    async fn loading_partial_file_keeps_defaults_for_missing_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "host = \"127.0.0.1\"\nread_timeout = 250").unwrap();

        let config = Config::load(Some(file.path())).await.unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.read_timeout(), Duration::from_millis(250));
        assert_eq!(config.write_timeout, 5000);
        assert_eq!(config.backlog, 10);
    }

    #[tokio::test]
    async fn loading_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");

        let result = Config::load(Some(&path)).await;

        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[tokio::test]
    async fn loading_invalid_file_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "backlog = \"many\"").unwrap();

        let result = Config::load(Some(file.path())).await;

        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }
}
