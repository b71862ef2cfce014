//! Web server module.

mod handlers;

pub use handlers::*;

use crate::config::ServerConfig;
use crate::monitor::{MonitoredService, StatusRegistry};

use axum::{routing::get, Router};
use chrono_tz::Tz;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub services: Arc<Vec<Arc<MonitoredService>>>,
    pub registry: StatusRegistry,
    pub timezone: Tz,
}

/// Read-only status API.
pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            .route("/api/services", get(handlers::handle_get_services))
            .route("/api/services/{name}", get(handlers::handle_get_service))
            .route("/health", get(handlers::handle_health))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the server on the configured address.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = tokio::net::TcpListener::bind((self.config.http_host.as_str(), self.config.http_port)).await?;
        tracing::info!("Web server listening on {}", listener.local_addr()?);

        axum::serve(listener, self.routes()).await?;

        Ok(())
    }
}
