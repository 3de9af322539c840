//! Configuration for aadhaard
//!
//! Sources, later ones winning: built-in defaults, an optional TOML file, then
//! `AADHAAR_`-prefixed environment variables with `__` between nesting levels
//! (e.g. `AADHAAR_STORAGE__TYPE=postgres`).

use aadhaar_ledger::ChainLogConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub ledger: ChainLogConfig,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            request_timeout_secs: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (for development/testing)
    #[default]
    Memory,

    /// PostgreSQL storage
    Postgres {
        url: String,

        #[serde(default = "default_pool_size")]
        max_connections: u32,

        #[serde(default = "default_connection_timeout")]
        connect_timeout_secs: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_token_attempts")]
    pub token_attempts: usize,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            token_attempts: default_token_attempts(),
        }
    }
}

/// Administrative surface. Without `admin_token` every admin call is refused.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub admin_token: Option<String>,

    /// Mount `POST /v1/admin/reset`. Development deployments only.
    #[serde(default)]
    pub dev_reset_enabled: bool,
}

impl fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminConfig")
            .field("admin_token", &self.admin_token.as_ref().map(|_| "<redacted>"))
            .field("dev_reset_enabled", &self.dev_reset_enabled)
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 3000))
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_token_attempts() -> usize {
    aadhaar_identity::DEFAULT_TOKEN_ATTEMPTS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ServiceConfig {
    /// Load configuration from defaults, an optional file and the environment.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        Self::load_from(path, config::Environment::with_prefix("AADHAAR"))
    }

    fn load_from(
        path: Option<&str>,
        environment: config::Environment,
    ) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&ServiceConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::with_name(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }

        builder = builder.add_source(
            environment
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
