//! convflow - conversational state-machine engine
//!
//! Carries multi-turn dialogs over a stateless request/response transport:
//! every turn reloads the conversation's memory, dispatches on keywords or
//! the active flow, and persists progress before answering.

mod api;
mod config;
mod db;
mod flow;
mod memory;
mod message;
mod nlp;
mod plugin;
mod runtime;
mod settings;
mod state_machine;
mod tasks;
mod vocab;

use api::{create_router, AppState};
use config::Config;
use db::Database;
use runtime::{DatabaseMemoryStore, RuntimeManager};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "convflow=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = Config::from_env();

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Initialize database
    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    // Plugin wiring is checked once, here
    let plugin = match settings::plugin(&config.base_url) {
        Ok(plugin) => plugin,
        Err(e) => {
            tracing::error!(error = %e, "Invalid plugin configuration");
            return Err(e.into());
        }
    };
    tracing::info!(
        plugin = %plugin.name(),
        handlers = plugin.vocabulary().len(),
        flows = ?plugin.flows().selectors(),
        "Plugin loaded"
    );

    let runtime = RuntimeManager::new(
        Arc::new(DatabaseMemoryStore::new(db.clone())),
        Arc::new(plugin),
        config.queue_depth,
        config.turn_timeout,
    );

    // Create application state
    let state = AppState::new(Arc::new(runtime), db, config.apology.clone());

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new().gzip(true).br(true).deflate(true);

    let app = create_router(state)
        .layer(cors)
        .layer(compression)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("convflow server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
