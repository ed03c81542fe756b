use crate::bus::EventBus;
use crate::config::{ConfigStore, CONFIG_FILE};
use crate::error::{HearthError, Result};
use crate::metrics::{MetricsCollector, MetricsSource, SysinfoSource};
use crate::status::{StatusMap, StatusStore};
use crate::stream::event_stream;
use crate::uptime::HealthChecker;
use crate::watcher::ConfigWatcher;
use axum::{extract::State, routing::get, Json, Router};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

/// State shared by the HTTP handlers and the background tasks
pub struct AppState {
    pub config: Arc<ConfigStore>,
    pub status: Arc<StatusStore>,
    pub bus: EventBus,
    pub metrics: Arc<MetricsCollector>,
    /// Cancelled when the server shuts down; open event streams end with it
    pub shutdown_token: CancellationToken,
}

impl AppState {
    /// Build the shared state around an already loaded configuration.
    ///
    /// The outbox capacity is taken from the configuration at this point and
    /// is not affected by later reloads.
    pub fn new(
        config: Arc<ConfigStore>,
        metrics_source: Box<dyn MetricsSource>,
        shutdown_token: CancellationToken,
    ) -> Self {
        let bus = EventBus::new(config.snapshot().settings.outbox_capacity);
        let metrics = Arc::new(MetricsCollector::new(metrics_source, bus.clone()));
        Self {
            config,
            status: Arc::new(StatusStore::new()),
            bus,
            metrics,
            shutdown_token,
        }
    }
}

/// Current status of every probed target, keyed by fingerprint
pub async fn status_snapshot(State(state): State<Arc<AppState>>) -> Json<StatusMap> {
    Json(state.status.snapshot().as_ref().clone())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/events", get(event_stream))
        .route("/api/status", get(status_snapshot))
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}

/// Run the web server and the background monitors.
///
/// # Arguments
///
/// * `port` - Port to bind; falls back to `settings.port` from the configuration
/// * `config_path` - Configuration file; defaults to [`CONFIG_FILE`]
/// * `cancel_token` - Cancelling it stops the server and every background task
///
/// # Errors
///
/// Returns an error if:
/// - The configuration cannot be loaded at startup
/// - The configuration directory cannot be watched
/// - The server fails to bind to the specified address
pub async fn run(
    port: Option<u16>,
    config_path: Option<PathBuf>,
    cancel_token: CancellationToken,
) -> Result<()> {
    tracing::info!("Initializing server");

    let config_path = config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    let config = Arc::new(ConfigStore::open(config_path)?);
    let settings = config.snapshot().settings.clone();
    let health_interval = settings.health_interval();
    let metrics_interval = settings.metrics_interval();

    let state = Arc::new(AppState::new(
        Arc::clone(&config),
        Box::new(SysinfoSource::new()),
        cancel_token.clone(),
    ));

    let health = Arc::new(HealthChecker::new(
        Arc::clone(&config),
        Arc::clone(&state.status),
        state.bus.clone(),
    ));

    let watcher = ConfigWatcher::new(Arc::clone(&config), state.bus.clone())
        .with_reload_hook(health.waker())
        .spawn(cancel_token.clone())?;

    let health_task = {
        let health = Arc::clone(&health);
        let token = cancel_token.clone();
        tokio::spawn(async move { health.run(health_interval, token).await })
    };

    let metrics_task = {
        let metrics = Arc::clone(&state.metrics);
        let token = cancel_token.clone();
        tokio::spawn(async move { metrics.run(metrics_interval, token).await })
    };

    let app = router(state);
    tracing::debug!("Routes configured");

    let port = port.unwrap_or(settings.port);
    let address: SocketAddr = format!("0.0.0.0:{port}").parse()?;
    tracing::info!("Binding server to address: {address}");

    let served = match tokio::net::TcpListener::bind(address).await {
        Ok(listener) => {
            tracing::info!("Dashboard events available on: http://{address}/events");
            let shutdown = cancel_token.clone();
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
                .map_err(HearthError::ServerRun)
        }
        Err(e) => Err(HearthError::ServerRun(e)),
    };

    // Stop the background tasks whether the server ended cleanly or not.
    cancel_token.cancel();
    for task in [watcher, health_task, metrics_task] {
        if let Err(e) = task.await {
            tracing::error!("Background task failed: {e}");
        }
    }

    served?;
    tracing::info!("Server shutdown complete");
    Ok(())
}
