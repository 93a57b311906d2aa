//! Adapter configuration.
//!
//! Configuration lives in a YAML file mirroring the shape the adapter has
//! always used, with environment-variable overrides for the fields that
//! matter in containers:
//!
//! ```yaml
//! backend:
//!   project_id: my-project
//!   instance_id: my-instance
//!   database_name: my-database
//!   query_limit: 5000
//!   dynamo_query_limit: 5000
//!   session:
//!     min: 100
//!     max: 400
//!     grpc_channels: 4
//! server:
//!   listen_addr: 0.0.0.0:9050
//!   log_level: info
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid YAML for the expected shape.
    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Session pool sizing for the backend client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Minimum pooled sessions.
    pub min: u64,
    /// Maximum pooled sessions; bounds adapter-side concurrency.
    pub max: u64,
    /// Number of gRPC channels for the backend client.
    pub grpc_channels: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min: 100,
            max: 400,
            grpc_channels: 4,
        }
    }
}

/// Connection and limit settings for the relational backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Cloud project id.
    pub project_id: String,
    /// Backend instance id.
    pub instance_id: String,
    /// Database name inside the instance.
    pub database_name: String,
    /// Row limit applied to scans when the caller does not set one.
    pub query_limit: i64,
    /// Default page size for Query requests that pass `Limit: 0`.
    pub dynamo_query_limit: i64,
    /// Session pool sizing.
    pub session: SessionConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            instance_id: String::new(),
            database_name: String::new(),
            query_limit: 5000,
            dynamo_query_limit: 5000,
            session: SessionConfig::default(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub listen_addr: String,
    /// Log level filter, overridden by `RUST_LOG`.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9050".to_owned(),
            log_level: "info".to_owned(),
        }
    }
}

/// Top-level adapter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Backend connection and limits.
    pub backend: BackendConfig,
    /// Server settings.
    pub server: ServerConfig,
}

impl AdapterConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(raw)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from the file named by `DYNABRIDGE_CONFIG`, or defaults plus
    /// environment overrides when the variable is unset.
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var("DYNABRIDGE_CONFIG") {
            Ok(path) => Self::from_file(path),
            Err(_) => {
                let mut config = Self::default();
                config.apply_env_overrides();
                Ok(config)
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LISTEN_ADDR") {
            self.server.listen_addr = v;
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            self.server.log_level = v;
        }
    }
}
