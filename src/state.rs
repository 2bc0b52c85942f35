use crate::config::ServerConfig;
use crate::shutdown::{ShutdownConfig, ShutdownCoordinator};
use std::sync::Arc;

/// Shared handler state. Sessions are never shared between requests; each
/// request opens its own data context.
#[derive(Clone)]
pub struct AppState {
    config: Arc<ServerConfig>,
    shutdown: Arc<ShutdownCoordinator>,
}

impl AppState {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        let shutdown_config =
            ShutdownConfig::default().with_in_flight_timeout(config.graceful_shutdown_timeout_secs);
        Self::with_shutdown(config, Arc::new(ShutdownCoordinator::new(shutdown_config)))
    }

    pub fn with_shutdown(config: Arc<ServerConfig>, shutdown: Arc<ShutdownCoordinator>) -> Self {
        Self { config, shutdown }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }
}
