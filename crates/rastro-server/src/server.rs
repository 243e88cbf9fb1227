//! Router assembly, WebSocket upgrade, and the listener task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use axum::routing::{get, put};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use rastro_core::ConnectionId;
use rastro_hub::{BroadcastEngine, DriverDirectory, LocationStore, ObserverRegistry};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::handlers;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::{serve_socket, ConnectionHandler};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BroadcastEngine>,
    pub directory: Arc<DriverDirectory>,
    pub config: Arc<ServerConfig>,
    pub shutdown: CancellationToken,
    /// Upgraded socket tasks, drained on shutdown.
    pub connections: TaskTracker,
    pub start_time: Instant,
    pub metrics: Option<PrometheusHandle>,
}

/// The location hub server.
pub struct RastroServer {
    config: Arc<ServerConfig>,
    engine: Arc<BroadcastEngine>,
    directory: Arc<DriverDirectory>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl RastroServer {
    pub fn new(config: ServerConfig) -> Self {
        let engine = BroadcastEngine::new(
            Arc::new(LocationStore::new()),
            Arc::new(ObserverRegistry::new()),
        );
        Self {
            config: Arc::new(config),
            engine: Arc::new(engine),
            directory: Arc::new(DriverDirectory::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<BroadcastEngine> {
        &self.engine
    }

    pub fn directory(&self) -> &Arc<DriverDirectory> {
        &self.directory
    }

    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    fn state(&self) -> AppState {
        AppState {
            engine: Arc::clone(&self.engine),
            directory: Arc::clone(&self.directory),
            config: Arc::clone(&self.config),
            shutdown: self.shutdown.token(),
            connections: self.shutdown.connections(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        }
    }

    /// Build the axum router.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/tracks", get(handlers::list_tracks))
            .route(
                "/drivers",
                get(handlers::list_drivers).post(handlers::create_driver),
            )
            .route("/drivers/{id}", get(handlers::get_driver))
            .route("/drivers/{id}/track", get(handlers::get_track))
            .route("/drivers/{id}/location", put(handlers::update_driver_location))
            .route("/health", get(handlers::health))
            .route("/metrics", get(handlers::metrics))
            .with_state(self.state())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind and serve in a background task.
    ///
    /// Returns the bound address (useful with port 0) and the task handle.
    /// The task ends once the shutdown token is cancelled.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr: addr.clone(), source })?;
        let local = listener.local_addr()?;

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server terminated with error");
            }
        });

        info!(addr = %local, "rastro server listening");
        Ok((local, handle))
    }
}

/// GET /ws
///
/// The peer address is the connection id and also the driver id its
/// updates are stored under.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let handler = ConnectionHandler::new(ConnectionId::from(peer), Arc::clone(&state.engine));
    let config = Arc::clone(&state.config);
    let shutdown = state.shutdown.clone();
    let connections = state.connections.clone();

    ws.max_message_size(config.max_message_size)
        .on_failed_upgrade(move |e| {
            warn!(peer = %peer, error = %e, "websocket upgrade failed");
        })
        .on_upgrade(move |socket| {
            connections.track_future(async move {
                let reason = serve_socket(socket, handler, &config, shutdown).await;
                debug!(peer = %peer, reason = reason.label(), "connection task finished");
            })
        })
}
