//! Server setup and lifecycle management

use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::{build_router, ServiceState};
use tokio::net::TcpListener;
use tracing::{error, info};

pub struct Server {
    config: ServiceConfig,
    state: ServiceState,
}

impl Server {
    /// Connect storage and assemble the services.
    pub async fn new(config: ServiceConfig) -> Result<Self, ServiceError> {
        let state = ServiceState::bootstrap(&config).await?;
        Ok(Self { config, state })
    }

    /// Serve until ctrl-c or SIGTERM.
    pub async fn run(self) -> Result<(), ServiceError> {
        let addr = self.config.server.listen_addr;
        let backend = self.state.storage_backend();
        let app = build_router(self.state);

        let listener = TcpListener::bind(addr).await?;
        info!(%addr, backend, "aadhaard listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("aadhaard stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(%err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(%err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
