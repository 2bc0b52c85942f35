//! Graceful shutdown coordination.
//!
//! On SIGINT or SIGTERM the coordinator cancels its token, the HTTP server
//! stops accepting connections and in-flight validation sessions get
//! [`ShutdownConfig::in_flight_timeout`] to finish.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use strum::Display;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    pub in_flight_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            in_flight_timeout: Duration::from_secs(30),
        }
    }
}

impl ShutdownConfig {
    pub fn with_in_flight_timeout(mut self, timeout_secs: u64) -> Self {
        self.in_flight_timeout = Duration::from_secs(timeout_secs);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ShutdownPhase {
    Running,
    /// Signal received; no new connections are accepted
    Draining,
    Complete,
    /// In-flight timeout elapsed with sessions still running
    Forced,
}

pub struct ShutdownCoordinator {
    config: ShutdownConfig,
    phase: RwLock<ShutdownPhase>,
    token: CancellationToken,
    active_requests: AtomicU64,
}

impl ShutdownCoordinator {
    pub fn new(config: ShutdownConfig) -> Self {
        Self {
            config,
            phase: RwLock::new(ShutdownPhase::Running),
            token: CancellationToken::new(),
            active_requests: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ShutdownConfig {
        &self.config
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub async fn phase(&self) -> ShutdownPhase {
        *self.phase.read().await
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn active_request_count(&self) -> u64 {
        self.active_requests.load(Ordering::Relaxed)
    }

    /// Count a request as in flight until the returned guard drops.
    pub fn track_request(self: &Arc<Self>) -> RequestGuard {
        self.active_requests.fetch_add(1, Ordering::Relaxed);
        RequestGuard {
            coordinator: Arc::clone(self),
        }
    }

    /// Resolve on SIGINT, SIGTERM or an explicit [`ShutdownCoordinator::initiate`].
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    warn!("failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, initiating graceful shutdown"),
            _ = terminate => info!("received SIGTERM, initiating graceful shutdown"),
            _ = self.token.cancelled() => debug!("shutdown initiated programmatically"),
        }

        self.initiate().await;
    }

    pub async fn initiate(&self) {
        let mut phase = self.phase.write().await;
        if *phase == ShutdownPhase::Running {
            *phase = ShutdownPhase::Draining;
        }
        self.token.cancel();
    }

    /// Wait for in-flight requests, bounded by the configured timeout.
    pub async fn drain(&self) -> ShutdownPhase {
        let deadline = tokio::time::Instant::now() + self.config.in_flight_timeout;
        loop {
            let active = self.active_request_count();
            if active == 0 {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    remaining_requests = active,
                    "in-flight timeout reached, abandoning running sessions"
                );
                *self.phase.write().await = ShutdownPhase::Forced;
                return ShutdownPhase::Forced;
            }
            debug!(active_requests = active, "waiting for sessions to complete");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        *self.phase.write().await = ShutdownPhase::Complete;
        info!("graceful shutdown complete");
        ShutdownPhase::Complete
    }
}

pub struct RequestGuard {
    coordinator: Arc<ShutdownCoordinator>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.coordinator
            .active_requests
            .fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guard_tracks_in_flight_requests() {
        let coordinator = Arc::new(ShutdownCoordinator::new(ShutdownConfig::default()));
        let guard = coordinator.track_request();
        assert_eq!(coordinator.active_request_count(), 1);
        drop(guard);
        assert_eq!(coordinator.active_request_count(), 0);
    }

    #[tokio::test]
    async fn initiate_cancels_token_and_drains() {
        let coordinator = ShutdownCoordinator::new(ShutdownConfig::default());
        assert_eq!(coordinator.phase().await, ShutdownPhase::Running);

        coordinator.initiate().await;
        assert!(coordinator.is_shutdown_initiated());
        assert_eq!(coordinator.phase().await, ShutdownPhase::Draining);

        assert_eq!(coordinator.drain().await, ShutdownPhase::Complete);
    }

    #[tokio::test]
    async fn drain_forces_after_timeout() {
        let coordinator = Arc::new(ShutdownCoordinator::new(
            ShutdownConfig::default().with_in_flight_timeout(0),
        ));
        let _guard = coordinator.track_request();
        coordinator.initiate().await;
        assert_eq!(coordinator.drain().await, ShutdownPhase::Forced);
        assert_eq!(ShutdownPhase::Forced.to_string(), "forced");
    }
}
