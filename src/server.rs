use axum::{
    handler::Handler,
    middleware::from_fn_with_state,
    routing::{post, MethodRouter},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::auth::{load_tokens, AuthGate};
use crate::cache::ListCache;
use crate::config::AppConfig;
use crate::database::{DatabaseManager, TableRepository, UserRepository};
use crate::handlers;
use crate::middleware::require_auth;
use crate::services::bootstrap_admin;

/// Exit code when in-flight requests outlive the shutdown grace period
pub const FORCED_EXIT_CODE: i32 = 22;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerSignal {
    Restart,
    Stop,
}

/// Lets handlers ask the serve loop to stop or restart
#[derive(Clone)]
pub struct ServerControl {
    tx: Arc<watch::Sender<Option<ServerSignal>>>,
}

impl Default for ServerControl {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerControl {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn request(&self, signal: ServerSignal) {
        info!(?signal, "server control requested");
        self.tx.send_replace(Some(signal));
    }

    pub fn requested(&self) -> Option<ServerSignal> {
        *self.tx.borrow()
    }

    /// Resolves once a stop or restart has been requested
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            if rx.borrow_and_update().is_some() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Everything a request needs, built once per server generation
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseManager,
    pub users: UserRepository,
    pub tables: TableRepository,
    pub cache: Arc<ListCache>,
    pub gate: AuthGate,
    pub control: ServerControl,
}

impl AppState {
    /// Connect, bootstrap the credential table and admin, load tokens, fill the cache
    pub async fn build(config: AppConfig, control: ServerControl) -> anyhow::Result<Self> {
        let db = DatabaseManager::connect(&config.database).await?;
        let users = UserRepository::new(db.clone(), config.database.main_table.clone())?;
        let tables = TableRepository::new(
            db.clone(),
            config.database.main_table.clone(),
            config.tables.deleted_prefix.clone(),
        );

        bootstrap_admin(&users, &config.auth).await?;

        let tokens = load_tokens(&config.auth).await?;
        info!(count = tokens.len(), "loaded access tokens");

        let cache = Arc::new(ListCache::new(tokens));
        cache.refresh(&users, &tables).await?;

        let gate = AuthGate::new(cache.clone(), users.clone(), &config.auth);

        Ok(Self {
            config: Arc::new(config),
            db,
            users,
            tables,
            cache,
            gate,
            control,
        })
    }

    /// Runs after a commit, so a failure only leaves the lists stale until the next refresh
    pub async fn refresh_cache(&self) {
        if let Err(e) = self.cache.refresh(&self.users, &self.tables).await {
            warn!(error = %e, "cache refresh failed; serving stale lists");
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/cmd", protected_post(handlers::command, &state))
        .route("/query", protected_post(handlers::raw_query, &state))
        .route("/user/:action", protected_post(handlers::user_action, &state))
        .route("/table/:action", protected_post(handlers::table_action, &state))
        .route("/data/:action", protected_post(handlers::table_action, &state))
        .fallback(handlers::fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// POST behind authentication; other methods on the same path fall through to
/// the unauthenticated fallback so `GET *` always redirects
fn protected_post<H, T>(handler: H, state: &AppState) -> MethodRouter<AppState>
where
    H: Handler<T, AppState>,
    T: 'static,
{
    post(handler)
        .route_layer(from_fn_with_state(state.clone(), require_auth))
        .fallback(handlers::fallback)
}

/// Serve until stopped. A restart request drains, rebuilds state from a fresh
/// configuration and binds again.
pub async fn run<F>(load_config: F) -> anyhow::Result<()>
where
    F: Fn() -> AppConfig,
{
    loop {
        let config = load_config();
        let grace = Duration::from_millis(config.server.shutdown_grace_ms);
        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
        let port = config.server.port;

        let control = ServerControl::new();
        let state = AppState::build(config, control.clone()).await?;

        let listener = TcpListener::bind(addr).await?;
        info!("Now listening on port {}", port);

        let (draining_tx, draining_rx) = oneshot::channel::<()>();
        let watchdog = tokio::spawn(async move {
            if draining_rx.await.is_ok() {
                tokio::time::sleep(grace).await;
                error!("Shutdown grace period of {:?} exceeded; forcing exit", grace);
                std::process::exit(FORCED_EXIT_CODE);
            }
        });

        let shutdown_control = control.clone();
        axum::serve(listener, app(state.clone()))
            .with_graceful_shutdown(async move {
                shutdown_signal(&shutdown_control).await;
                let _ = draining_tx.send(());
            })
            .await?;

        watchdog.abort();
        state.db.close().await;

        match control.requested() {
            Some(ServerSignal::Restart) => info!("Restarting server"),
            _ => {
                info!("Server stopped");
                return Ok(());
            }
        }
    }
}

async fn shutdown_signal(control: &ServerControl) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut term, mut quit) = match (signal(SignalKind::terminate()), signal(SignalKind::quit())) {
            (Ok(term), Ok(quit)) => (term, quit),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {}", e);
                return std::future::pending::<()>().await;
            }
        };
        tokio::select! {
            _ = term.recv() => info!("Received SIGTERM, shutting down"),
            _ = quit.recv() => info!("Received SIGQUIT, shutting down"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = control.wait() => {},
    }
}
