//! HTTP service classifying free-text queries into declared routes.

pub mod bootstrap;
pub mod classifier;
pub mod handlers;
pub mod lifecycle;
pub mod rest;
pub mod state;
pub mod sync;
pub mod telemetry;

pub use classifier::{RouteClassifier, RouteMatch};
pub use lifecycle::{HealthPhase, HealthState, Readiness};
pub use rest::build_router;
pub use state::AppState;
pub use sync::{RouteSynchronizer, SyncReport};

use semroute_core::{RouterError, RouterResult, ServiceConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Loads configuration, binds the listener and serves until shutdown.
///
/// Route synchronization runs in the background after the listener is
/// bound; probes report `starting` until it concludes.
pub async fn run_server() -> RouterResult<()> {
    let config = ServiceConfig::load()?;
    info!(?config, "Loaded configuration");

    let health = Arc::new(HealthState::new(config.router.readiness_recheck_interval()));
    let state = AppState::new(health);
    let app = rest::build_router(state.clone());

    let bind_address = config.server.bind_address.clone();
    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        RouterError::configuration(format!("invalid bind address '{bind_address}': {e}"))
    })?;

    let listener = TcpListener::bind(addr).await?;
    info!("Semroute API listening on {}", addr);

    tokio::spawn(bootstrap::bootstrap(state, config));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Semroute API shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM signal, initiating graceful shutdown");
        }
    }
}
