pub mod health;
pub mod ingest;
pub mod query;

use crate::config::Config;
use crate::storage::EventStore;
use std::sync::Arc;

/// State shared by all request handlers
///
/// Configuration is frozen at startup; the store is shared across requests
/// without further locking.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn EventStore>,
}

impl AppState {
    pub fn new(config: Arc<Config>, store: Arc<dyn EventStore>) -> Self {
        Self { config, store }
    }
}
