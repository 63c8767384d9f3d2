//! Configuration for the sortbench server binary.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;

/// Which of the three concurrency architectures to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    /// One thread per connection, sort inline.
    Simple,
    /// Per-connection reader threads feeding a fixed worker pool.
    Pooled,
    /// Readiness-multiplexed read/write threads plus a worker pool.
    Multiplexed,
}

/// Command-line arguments for the sortbench server
#[derive(Parser, Debug)]
#[command(name = "sortbench")]
#[command(version = "0.1.0")]
#[command(about = "A TCP sort-offload server with three concurrency architectures", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// TCP port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Server architecture to run
    #[arg(short, long, value_enum)]
    pub arch: Option<Architecture>,

    /// Number of sort worker threads (pooled and multiplexed
    /// architectures); 0 means one per CPU core
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Bound on the worker queue; omitted means unbounded. A full queue
    /// blocks the submitting reader (back-pressure).
    #[arg(long)]
    pub queue_depth: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// TCP port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Server architecture
    #[serde(default = "default_arch")]
    pub arch: Architecture,
    /// Number of sort worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Bound on the worker queue (unbounded when absent)
    pub queue_depth: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            arch: default_arch(),
            workers: default_workers(),
            queue_depth: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_port() -> u16 {
    7777
}

fn default_arch() -> Architecture {
    Architecture::Simple
}

fn default_workers() -> usize {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub arch: Architecture,
    pub workers: usize,
    pub queue_depth: Option<usize>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Config {
            port: cli.port.unwrap_or(toml_config.server.port),
            arch: cli.arch.unwrap_or(toml_config.server.arch),
            workers: cli.workers.unwrap_or(toml_config.server.workers),
            queue_depth: cli.queue_depth.or(toml_config.server.queue_depth),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.port, 7777);
        assert_eq!(config.server.arch, Architecture::Simple);
        assert_eq!(config.server.workers, 4);
        assert_eq!(config.server.queue_depth, None);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            port = 6666
            arch = "multiplexed"
            workers = 8
            queue_depth = 256

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 6666);
        assert_eq!(config.server.arch, Architecture::Multiplexed);
        assert_eq!(config.server.workers, 8);
        assert_eq!(config.server.queue_depth, Some(256));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TomlConfig = toml::from_str("[server]\narch = \"pooled\"\n").unwrap();
        assert_eq!(config.server.arch, Architecture::Pooled);
        assert_eq!(config.server.port, 7777);
        assert_eq!(config.server.workers, 4);
    }
}
