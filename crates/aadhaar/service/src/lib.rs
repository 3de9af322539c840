//! Aadhaar Lite REST gateway.
//!
//! Translates JSON calls under `/v1` into identity registry and chain log
//! operations. Access tokens travel in request bodies, never in paths, so they
//! stay out of access logs.

#![deny(unsafe_code)]

pub mod config;
pub mod error;
mod routes;
pub mod server;

pub use config::{ServiceConfig, StorageConfig};
pub use error::{ApiError, ApiResult, ServiceError};

use aadhaar_identity::IdentityRegistry;
use aadhaar_ledger::ChainLog;
use aadhaar_storage::{InMemoryLedgerStorage, LedgerStorage};
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderMap;
use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Header carrying the administrative token.
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

#[derive(Clone)]
pub struct ServiceState {
    pub registry: Arc<IdentityRegistry>,
    pub chain: Arc<ChainLog>,
    admin: Arc<AdminGuard>,
    limits: RequestLimits,
}

#[derive(Debug, Clone, Copy)]
struct RequestLimits {
    timeout: Duration,
    max_body_bytes: usize,
    dev_reset_enabled: bool,
}

impl ServiceState {
    /// Build the storage backend named by `config` and wire the services over it.
    pub async fn bootstrap(config: &ServiceConfig) -> Result<Self, ServiceError> {
        match &config.storage {
            StorageConfig::Memory => {
                info!("using in-memory storage; state is lost on restart");
                Ok(Self::with_storage(
                    Arc::new(InMemoryLedgerStorage::new()),
                    config,
                ))
            }
            #[cfg(feature = "postgres")]
            StorageConfig::Postgres {
                url,
                max_connections,
                connect_timeout_secs,
            } => {
                let storage = aadhaar_storage::PostgresLedgerStorage::connect_with_options(
                    url,
                    *max_connections,
                    *connect_timeout_secs,
                )
                .await?;
                info!(max_connections, "connected to postgres storage");
                Ok(Self::with_storage(Arc::new(storage), config))
            }
            #[cfg(not(feature = "postgres"))]
            StorageConfig::Postgres { .. } => Err(ServiceError::Config(
                "postgres storage requested but this build lacks the `postgres` feature"
                    .to_string(),
            )),
        }
    }

    pub fn with_storage<S>(storage: Arc<S>, config: &ServiceConfig) -> Self
    where
        S: LedgerStorage + 'static,
    {
        let registry = IdentityRegistry::new(storage.clone())
            .with_token_attempts(config.identity.token_attempts);
        let chain = ChainLog::with_config(storage, config.ledger.clone());

        if config.admin.dev_reset_enabled {
            warn!("development reset endpoint is enabled");
        }

        Self {
            registry: Arc::new(registry),
            chain: Arc::new(chain),
            admin: Arc::new(AdminGuard::new(config.admin.admin_token.as_deref())),
            limits: RequestLimits {
                timeout: config.server.request_timeout(),
                max_body_bytes: config.server.max_body_bytes,
                dev_reset_enabled: config.admin.dev_reset_enabled,
            },
        }
    }

    pub fn storage_backend(&self) -> &'static str {
        self.chain.storage().backend_label()
    }

    fn authorize_admin(&self, headers: &HeaderMap) -> ApiResult<()> {
        self.admin.authorize(headers)
    }
}

/// Holds only a digest of the configured admin token.
struct AdminGuard {
    token_digest: Option<blake3::Hash>,
}

impl AdminGuard {
    fn new(token: Option<&str>) -> Self {
        Self {
            token_digest: token
                .filter(|t| !t.is_empty())
                .map(|t| blake3::hash(t.as_bytes())),
        }
    }

    fn authorize(&self, headers: &HeaderMap) -> ApiResult<()> {
        let Some(expected) = &self.token_digest else {
            warn!("admin call refused; no admin token configured");
            return Err(ApiError::Unauthorized);
        };
        let presented = headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        // blake3::Hash equality is constant-time.
        if blake3::hash(presented.as_bytes()) == *expected {
            Ok(())
        } else {
            warn!("admin call refused; bad admin token");
            Err(ApiError::Unauthorized)
        }
    }
}

pub fn build_router(state: ServiceState) -> Router {
    let limits = state.limits;

    let mut v1 = Router::new()
        .route("/health", get(routes::health))
        .route("/register", post(routes::register))
        .route("/authenticate", post(routes::authenticate))
        .route("/events", post(routes::record_event))
        .route("/history", post(routes::history))
        .route("/chain/verify", get(routes::verify_chain))
        .route(
            "/admin/identities/:identity_hash/active",
            put(routes::set_identity_active),
        );
    if limits.dev_reset_enabled {
        v1 = v1.route("/admin/reset", post(routes::reset));
    }

    Router::new()
        .nest("/v1", v1)
        .layer(DefaultBodyLimit::max(limits.max_body_bytes))
        .layer(TimeoutLayer::new(limits.timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
