//! Configuration structures for FinServe
//!
//! This module defines the server configuration. Configuration can be loaded
//! from a YAML file and is typically overridden by command-line flags before
//! validation; after validation it is never mutated.

use crate::error::{FinserveError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for the prediction server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server binding address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path to the serialized model artifact
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Connection and timing limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Connection and timing limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of concurrently serviced connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Read buffer size; a request larger than this is truncated at the socket
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,

    /// Idle-client timeout for the read phase, in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Slow-inference timeout for the predict phase, in milliseconds
    #[serde(default = "default_predict_timeout_ms")]
    pub predict_timeout_ms: u64,

    /// How long shutdown waits for in-flight connections, in milliseconds
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Listen backlog for the accepting socket
    #[serde(default = "default_accept_backlog")]
    pub accept_backlog: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_request_bytes: default_max_request_bytes(),
            read_timeout_ms: default_read_timeout_ms(),
            predict_timeout_ms: default_predict_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            accept_backlog: default_accept_backlog(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8888
}

fn default_model_path() -> PathBuf {
    PathBuf::from("financial_model.pt")
}

fn default_max_connections() -> usize {
    64
}

fn default_max_request_bytes() -> usize {
    4096
}

fn default_read_timeout_ms() -> u64 {
    5_000
}

fn default_predict_timeout_ms() -> u64 {
    10_000
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

fn default_accept_backlog() -> u32 {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            model_path: default_model_path(),
            limits: LimitsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            FinserveError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: ServerConfig = serde_yaml::from_str(&content).map_err(|e| {
            FinserveError::config(format!("Failed to parse config file {}: {}", path.display(), e))
        })?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(FinserveError::config("Port must be in range 1-65535"));
        }
        if self.model_path.as_os_str().is_empty() {
            return Err(FinserveError::config("Model path must not be empty"));
        }
        if self.limits.max_connections == 0 {
            return Err(FinserveError::config("max_connections must be positive"));
        }
        if self.limits.max_request_bytes == 0 {
            return Err(FinserveError::config("max_request_bytes must be positive"));
        }
        Ok(())
    }

    /// Get the read-phase timeout as Duration
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.limits.read_timeout_ms)
    }

    /// Get the predict-phase timeout as Duration
    pub fn predict_timeout(&self) -> Duration {
        Duration::from_millis(self.limits.predict_timeout_ms)
    }

    /// Get the shutdown grace period as Duration
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.limits.shutdown_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_validate() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.port, 8888);
        assert_eq!(config.model_path, PathBuf::from("financial_model.pt"));
        assert_eq!(config.limits.max_request_bytes, 4096);
    }

    #[test]
    fn test_port_zero_rejected() {
        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_model_path_rejected() {
        let config = ServerConfig {
            model_path: PathBuf::new(),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_partial_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "port: 9100").unwrap();
        writeln!(file, "model_path: /models/risk.pt").unwrap();
        writeln!(file, "limits:").unwrap();
        writeln!(file, "  max_connections: 8").unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.model_path, PathBuf::from("/models/risk.pt"));
        assert_eq!(config.limits.max_connections, 8);
        // Unspecified limits fall back to defaults
        assert_eq!(config.limits.read_timeout_ms, 5_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_missing() {
        let err = ServerConfig::from_file("/nonexistent/finserve.yaml").unwrap_err();
        assert!(matches!(err, FinserveError::Config(_)));
    }
}
