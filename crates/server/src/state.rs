//! Application state shared across handlers.

use crate::upstream::RegistryClient;
use std::sync::Arc;
use tfmirror_core::Config;
use tfmirror_storage::Storage;
use tokio::sync::Mutex;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Object store holding cached archives.
    pub storage: Arc<dyn Storage>,
    /// Upstream registry client.
    pub upstream: Arc<RegistryClient>,
    /// Serializes archive installs so concurrent misses trigger exactly one
    /// upstream download. Installs are rare relative to hits, so a single
    /// process-wide lock is sufficient.
    pub install_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(config: Config, storage: Arc<dyn Storage>, upstream: Arc<RegistryClient>) -> Self {
        Self {
            config: Arc::new(config),
            storage,
            upstream,
            install_lock: Arc::new(Mutex::new(())),
        }
    }
}
