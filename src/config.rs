//! Runner configuration loaded from a TOML file with [database] and [workload] sections.

use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_DB_HOST: &str = "localhost";
const DEFAULT_DB_PORT: u16 = 5432;
const DEFAULT_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub workload: WorkloadConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub db: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkloadConfig {
    pub workload_path: PathBuf,
    pub threads: usize,
    /// Global run timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_host() -> String {
    DEFAULT_DB_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_DB_PORT
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Config {
    /// Load and validate a config file. Any I/O or parse error is fatal at startup.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config {}: {}", path.display(), e))?;
        let config: Config = toml::from_str(&raw)
            .map_err(|e| format!("failed to parse config {}: {}", path.display(), e))?;

        if config.workload.threads == 0 {
            return Err("workload.threads must be at least 1".into());
        }

        Ok(config)
    }
}
