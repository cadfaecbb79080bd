use std::sync::Arc;

use crate::analysis::{ResultStore, SimulatedProvider};
use crate::config::{AppConfig, ServerConfig};

/// Shared handler state. The server always answers with the simulator; the
/// store is the one the simulator writes to.
#[derive(Clone)]
pub struct AppState {
    pub simulator: Arc<SimulatedProvider>,
    pub store: Arc<ResultStore>,
    pub server: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: &AppConfig) -> Self {
        let store = Arc::new(ResultStore::new());
        let simulator = SimulatedProvider::new(store.clone())
            .with_latency(config.analysis.latency.clone())
            .with_unknown_id_policy(config.analysis.unknown_id_policy);
        Self {
            simulator: Arc::new(simulator),
            store,
            server: Arc::new(config.server.clone()),
        }
    }
}
