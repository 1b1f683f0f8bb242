use serde::Deserialize;
use std::{
    net::{IpAddr, Ipv4Addr},
    path::{Path, PathBuf},
    time::Duration,
};

use crate::config::ConfigError;

#[derive(Debug, Deserialize, Clone)]
pub struct PoolConfig {
    /// Time between two health check rounds over every pool (in
    /// milliseconds).
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval: u64,
    /// Timeout to establish a connection to a process during a health
    /// check (in milliseconds).
    #[serde(default = "default_io_timeout")]
    pub connection_timeout: u32,
    /// Timeout writing the health check request (in milliseconds).
    #[serde(default = "default_io_timeout")]
    pub write_timeout: u32,
    /// Timeout reading the health check response (in milliseconds).
    #[serde(default = "default_io_timeout")]
    pub read_timeout: u32,
    /// How long a freshly spawned process has to answer its first health
    /// check before it is killed (in milliseconds).
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout: u64,
    /// How long a process has to exit after SIGTERM before it is killed
    /// (in milliseconds).
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
    /// When set, an nginx upstream block per pool listing the healthy ports
    /// is written to this file after every health check round.
    #[serde(default)]
    pub upstreams_file: Option<PathBuf>,
    /// The pools to manage.
    pub pools: Vec<PoolSpec>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PoolSpec {
    /// Pool name, used in logs and in the upstream name.
    pub name: String,
    /// Executable started for each process. It receives the port as its
    /// first argument and `--host <host>`.
    pub command: PathBuf,
    /// Interface the processes bind to and are checked on.
    #[serde(default = "default_host")]
    pub host: IpAddr,
    /// Port of the first process, the following ones take the next ports.
    #[serde(default = "default_first_port")]
    pub first_port: u16,
    #[serde(default = "default_min_processes")]
    pub min_processes: usize,
    #[serde(default = "default_max_processes")]
    pub max_processes: usize,
}

fn default_health_check_interval() -> u64 {
    5000
}

fn default_io_timeout() -> u32 {
    500
}

fn default_startup_timeout() -> u64 {
    2000
}

fn default_shutdown_timeout() -> u64 {
    5000
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_first_port() -> u16 {
    8000
}

fn default_min_processes() -> usize {
    2
}

fn default_max_processes() -> usize {
    5
}

impl PoolConfig {
    pub async fn load(path: &Path) -> Result<PoolConfig, ConfigError> {
        let display = path.display().to_string();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: display.clone(),
                source,
            })?;
        PoolConfig::parse(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: display,
                source,
            },
            ConfigError::Invalid { reason, .. } => ConfigError::Invalid {
                path: display,
                reason,
            },
            e => e,
        })
    }

    /// Parses and validates a TOML document.
    pub fn parse(content: &str) -> Result<PoolConfig, ConfigError> {
        let config: PoolConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: String::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            path: String::new(),
            reason,
        };
        if self.pools.is_empty() {
            return Err(invalid("No pools configured".to_string()));
        }
        for pool in &self.pools {
            if pool.max_processes == 0 {
                return Err(invalid(format!(
                    "Pool {} must allow at least one process",
                    pool.name
                )));
            }
            if pool.min_processes > pool.max_processes {
                return Err(invalid(format!(
                    "Pool {} has min_processes greater than max_processes",
                    pool.name
                )));
            }
        }
        Ok(())
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsing_pool_with_defaults() {
        let config = PoolConfig::parse(
            r#"
            [[pools]]
            name = "search"
            command = "./search"
            "#,
        )
        .unwrap();

        assert_eq!(config.health_check_interval(), Duration::from_secs(5));
        assert_eq!(config.upstreams_file, None);
        let pool = &config.pools[0];
        assert_eq!(pool.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(pool.first_port, 8000);
        assert_eq!(pool.min_processes, 2);
        assert_eq!(pool.max_processes, 5);
    }

    #[test]
    fn parsing_several_pools() {
        let config = PoolConfig::parse(
            r#"
            health_check_interval = 250
            upstreams_file = "/tmp/upstreams.conf"

            [[pools]]
            name = "search"
            command = "./search"
            first_port = 8000

            [[pools]]
            name = "auth"
            command = "./auth"
            first_port = 8100
            min_processes = 1
            max_processes = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.health_check_interval(), Duration::from_millis(250));
        assert_eq!(config.pools.len(), 2);
        assert_eq!(config.pools[1].name, "auth");
        assert_eq!(config.pools[1].first_port, 8100);
        assert_eq!(config.pools[1].max_processes, 3);
    }

    #[test]
    fn parsing_without_pools_fails() {
        let result = PoolConfig::parse("pools = []");

        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn parsing_min_above_max_fails() {
        let result = PoolConfig::parse(
            r#"
            [[pools]]
            name = "search"
            command = "./search"
            min_processes = 4
            max_processes = 2
            "#,
        );

        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn parsing_invalid_host_fails() {
        let result = PoolConfig::parse(
            r#"
            [[pools]]
            name = "search"
            command = "./search"
            host = "localhost"
            "#,
        );

        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[tokio::test]
    async fn loading_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();

        let result = PoolConfig::load(&dir.path().join("pool.toml")).await;

        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
