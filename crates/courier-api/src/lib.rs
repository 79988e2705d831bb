//! # courier-api
//!
//! Ingestion surface for the Courier relay: the `/send` and `/health`
//! endpoints, and the service binary wiring the publisher, subscriber
//! loop, and adapters together.

pub mod health;
pub mod models;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use courier_core::Publisher;
use health::HealthState;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Publish side of the relay.
    pub publisher: Arc<Publisher>,
    /// Cached queue reachability for the liveness probe.
    pub health: Arc<HealthState>,
}

/// Create the application router.
pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::api_routes(state).layer(cors)
}

/// Serve the API until the process receives ctrl-c or SIGTERM.
pub async fn serve(port: u16, state: AppState) -> Result<(), std::io::Error> {
    let app = create_app(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!("starting courier API on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
