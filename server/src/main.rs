//! Tidesync Server - keeps a local replica in step with a remote one.
//!
//! Every entity type of the catalog lives in an embedded SQLite database
//! (local) and in PostgreSQL (remote). Passes run on request over HTTP and in
//! the background on a schedule, using the tidesync-engine reconciler.

mod auth;
mod catalog;
mod config;
mod db;
mod error;
mod handlers;
mod pass;
mod routes;
mod scheduler;
mod stores;

use crate::config::Config;
use crate::db::{LocalPool, RemotePool, SqliteCursorStore};
use crate::pass::InFlight;
use crate::stores::{Bridge, SqlStores};
use axum::Router;
use std::sync::Arc;
use tidesync_engine::{RegistryError, SyncOptions, SyncOrchestrator};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: SyncOrchestrator,
    pub cursors: SqliteCursorStore,
    pub in_flight: Arc<InFlight>,
}

impl AppState {
    /// Wire the catalog to both replicas. Must be called inside the runtime.
    pub fn new(config: Config, local: LocalPool, remote: RemotePool) -> Result<Self, RegistryError> {
        let bridge = Bridge::current();
        let stores = SqlStores::new(local.clone(), remote, bridge.clone());
        let registry = catalog::build_registry(&stores)?;

        let orchestrator = SyncOrchestrator::new(registry).with_options(
            SyncOptions::default()
                .with_max_workers(config.sync_workers)
                .with_apply_policy(config.apply_policy)
                .with_timeout(config.sync_timeout),
        );
        let cursors = SqliteCursorStore::new(local, bridge, config.sync_interval_ms());

        Ok(Self {
            config: Arc::new(config),
            orchestrator,
            cursors,
            in_flight: InFlight::new_shared(),
        })
    }
}

/// Build the router with all routes and layers.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "tidesync_server=debug,tidesync_engine=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Tidesync Server on {}:{}", config.host, config.port);

    // Create database pools
    let local = db::create_local_pool(&config.local_database_url).await?;
    let remote = db::create_remote_pool(&config.remote_database_url).await?;

    // Run migrations
    tracing::info!("Running database migrations...");
    db::run_local_migrations(&local).await?;
    db::run_remote_migrations(&remote).await?;

    // Build application state
    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(config, local, remote)?;
    tracing::info!(
        entity_types = state.orchestrator.registry().len(),
        workers = state.orchestrator.options().max_workers,
        "Sync catalog ready"
    );

    // Start background passes
    let _scheduler = scheduler::spawn(state.clone());

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app(state)).await?;

    Ok(())
}
