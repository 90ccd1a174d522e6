//! API Server

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware, secret_digest},
    routes::create_router,
};
use crate::{config::ServerConfig, services::ServiceContainer};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

pub struct ApiServer {
    config: ServerConfig,
    services: Arc<ServiceContainer>,
}

impl ApiServer {
    pub fn new(services: Arc<ServiceContainer>) -> Self {
        Self {
            config: services.config().server.clone(),
            services,
        }
    }

    /// Start the API server and run until a shutdown signal
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let app = self.router();
        let addr = self.socket_addr()?;

        info!("Starting Void Collector API server");
        info!("   Listen: http://{}", addr);
        info!("   CORS: {:?}", self.config.cors_origins);
        info!("   Request timeout: {}s", self.config.request_timeout_secs);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("API server stopped");
        Ok(())
    }

    /// The full application with its middleware stack
    pub fn router(&self) -> axum::Router {
        let secret = &self.services.config().admin.secret;
        if secret.is_empty() {
            warn!("admin secret is empty; admin routes will refuse every request");
        }

        let state = Arc::new(AppState {
            services: self.services.clone(),
            admin_secret_digest: (!secret.is_empty()).then(|| secret_digest(secret)),
            version: env!("CARGO_PKG_VERSION").to_string(),
        });

        create_router(state)
            .layer(axum::middleware::from_fn(request_id_middleware))
            .layer(create_cors_layer(self.config.cors_origins.clone()))
            .layer(TimeoutLayer::new(Duration::from_secs(self.config.request_timeout_secs)))
            .layer(TraceLayer::new_for_http())
    }

    fn socket_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(SocketAddr::from((
            self.config.listen_address.parse::<std::net::IpAddr>()?,
            self.config.port,
        )))
    }
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}
