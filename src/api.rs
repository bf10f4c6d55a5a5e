//! HTTP API for delivering turns

mod handlers;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::db::Database;
use crate::runtime::RuntimeManager;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<RuntimeManager>,
    pub db: Database,
    /// Sent instead of any failure detail
    pub apology: String,
}

impl AppState {
    pub fn new(runtime: Arc<RuntimeManager>, db: Database, apology: impl Into<String>) -> Self {
        Self {
            runtime,
            db,
            apology: apology.into(),
        }
    }
}
