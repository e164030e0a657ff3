use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, Request},
    middleware,
    routing::{any, get},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    auth::{self, TokenGuard},
    config::Config,
    handlers::{self, ingest::MAX_EVENT_BYTES, AppState},
    logging::{init_tracing, redacted_uri},
    signals::shutdown_signal,
    storage::{
        maintenance::{start_maintenance, MaintenanceConfig},
        EventStore, SqliteEventStore,
    },
};

/// Start the log search server
///
/// This function:
/// 1. Initializes tracing with the configured format
/// 2. Connects to the store and prepares its schema
/// 3. Binds to the configured address and starts maintenance tasks
/// 4. Serves requests until SIGINT/SIGTERM, then drains
pub async fn start_server(config: Config) -> Result<()> {
    init_tracing(config.server.log_format);
    info!("Log search API starting...");
    for warning in config.warnings() {
        tracing::warn!("{}", warning);
    }

    let store = SqliteEventStore::connect(&config.storage.conn_str)
        .await
        .context("Error connecting to db")?;
    let store: Arc<dyn EventStore> = Arc::new(store);

    prepare_store(&*store).await?;
    spawn_index_creation(store.clone());

    log_ingest_filters(&config);

    let config = Arc::new(config);
    let app = create_router(AppState::new(config.clone(), store.clone()));

    let listener = tokio::net::TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.listen_addr))?;
    info!("Listening on {}", config.server.listen_addr);

    let maintenance = start_maintenance(
        store,
        config.storage.disk_capacity_gb,
        MaintenanceConfig::default(),
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            info!("Shutdown signal received, draining connections...");
        })
        .await;

    maintenance.abort();
    served?;
    info!("Server stopped gracefully");

    Ok(())
}

/// Create base tables and apply migrations. Both are fatal on failure.
pub async fn prepare_store(store: &dyn EventStore) -> Result<()> {
    store
        .initialize_schema()
        .await
        .context("Error initializing tables")?;

    info!("Running database migrations...");
    store
        .run_migrations()
        .await
        .context("Error running migrations")?;

    Ok(())
}

/// Index creation can be slow on large tables, so it runs in the background.
fn spawn_index_creation(store: Arc<dyn EventStore>) {
    tokio::spawn(async move {
        match store.create_indices().await {
            Ok(()) => info!("Indices ready"),
            Err(e) => tracing::warn!(error = %e, "Failed to create some indices"),
        }
    });
}

fn log_ingest_filters(config: &Config) {
    let filters = &config.ingest_filters;
    if filters.is_empty() {
        info!("No ingest filters configured, all events are stored");
        return;
    }

    let include: Vec<&str> = filters.api_name_include.iter().map(|p| p.as_str()).collect();
    let exclude: Vec<&str> = filters.api_name_exclude.iter().map(|p| p.as_str()).collect();
    info!(?include, ?exclude, "Ingest API name filters");
}

/// Create the Axum router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    let ingest_routes = Router::new()
        .route("/api/ingest", any(handlers::ingest::handle_ingest))
        .layer(middleware::from_fn_with_state(
            TokenGuard::new(state.config.auth.ingest_token.as_str()),
            auth::require_token,
        ))
        .with_state(state.clone());

    let query_routes = Router::new()
        .route("/api/query", get(handlers::query::handle_query))
        .layer(middleware::from_fn_with_state(
            TokenGuard::new(state.config.auth.query_token.as_str()),
            auth::require_token,
        ))
        .with_state(state);

    Router::new()
        // Public endpoints (no auth required)
        .route("/status", get(handlers::health::status))
        .merge(ingest_routes)
        .merge(query_routes)
        .layer(DefaultBodyLimit::max(MAX_EVENT_BYTES))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request| {
                tracing::info_span!(
                    "request",
                    method = %req.method(),
                    uri = %redacted_uri(req.uri()),
                )
            }),
        )
}
