//! HTTP server: shared state, router, gate and lifecycle

pub mod gate;
pub mod monitoring;
pub mod router;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::auth::Authenticator;
use crate::config::{AuthConfig, AuthMode, Config};
use crate::datasource::DatasourceRegistry;
use crate::tools::ToolHandler;
use crate::{Error, Result};

pub use monitoring::MetricsHandle;
pub use router::{create_health_router, create_router};

/// Shared application state
pub struct AppState {
    /// Token verification with caching
    pub authenticator: Arc<Authenticator>,
    /// Auth settings consulted by the gate (public paths, grant lifetime)
    pub auth: AuthConfig,
    /// Tool execution
    pub tools: Arc<ToolHandler>,
    /// Metrics exposition handle, if a recorder is installed
    pub metrics: Option<MetricsHandle>,
    /// Process start, for uptime reporting
    pub started_at: Instant,
    /// Request body limit for `/mcp`
    pub max_body_size: usize,
}

/// proms-mcp server
pub struct Server {
    config: Config,
    state: Arc<AppState>,
}

impl Server {
    /// Validate configuration and build every component.
    ///
    /// Fails with [`Error::Config`] on invalid settings, including an
    /// explicit CA path that does not exist.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let authenticator = Arc::new(Authenticator::from_config(&config.auth)?);
        if config.auth.mode == AuthMode::None {
            warn!("Authentication disabled (auth.mode = none); every caller is dev-user");
        } else {
            info!(method = %authenticator.method(), "Authentication enabled");
        }

        let registry = Arc::new(DatasourceRegistry::load(&config.prometheus.datasources_path));
        let metrics = monitoring::install_recorder();
        #[allow(clippy::cast_precision_loss)]
        telemetry_metrics::gauge!("proms_mcp_datasources_configured").set(registry.len() as f64);

        let tools = Arc::new(ToolHandler::new(registry, config.prometheus.query_timeout));

        let state = Arc::new(AppState {
            authenticator,
            auth: config.auth.clone(),
            tools,
            metrics,
            started_at: Instant::now(),
            max_body_size: config.server.max_body_size,
        });

        Ok(Self { config, state })
    }

    /// Shared state
    #[must_use]
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Main router
    pub fn router(&self) -> Router {
        create_router(Arc::clone(&self.state))
    }

    /// Serve until SIGINT/SIGTERM
    pub async fn run(self) -> Result<()> {
        let host = self
            .config
            .server
            .host
            .parse()
            .map_err(|e| Error::Config(format!("Invalid host: {e}")))?;
        let addr = SocketAddr::new(host, self.config.server.port);

        let (shutdown_tx, _) = broadcast::channel(1);

        if let Some(port) = self.config.server.health_port {
            let health_addr = SocketAddr::new(host, port);
            let listener = TcpListener::bind(health_addr).await?;
            info!(address = %health_addr, "Health and metrics listener started");

            let app = create_health_router(Arc::clone(&self.state));
            let mut shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(async move {
                let served = axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = shutdown_rx.recv().await;
                    })
                    .await;
                if let Err(e) = served {
                    error!(error = %e, "Health listener failed");
                }
            });
        }

        let listener = TcpListener::bind(addr).await?;
        info!(
            address = %addr,
            datasources = self.state.tools.registry().len(),
            "proms-mcp listening on /mcp"
        );

        let mut drain_rx = shutdown_tx.subscribe();
        let shutdown_timeout = self.config.server.shutdown_timeout;
        let serve = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal(shutdown_tx))
            .into_future();

        tokio::select! {
            served = serve => served.map_err(|e| Error::Internal(e.to_string()))?,
            () = async {
                let _ = drain_rx.recv().await;
                tokio::time::sleep(shutdown_timeout).await;
            } => {
                warn!(timeout = ?shutdown_timeout, "Graceful shutdown timed out, dropping open connections");
            }
        }

        info!("Server stopped");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
