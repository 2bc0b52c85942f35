pub mod checkpoint;
pub mod config;
pub mod context;
pub mod datasource;
pub mod error;
pub mod expectation;
pub mod logging;
pub mod naming;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod state;
pub mod validation;

pub use config::{CliArgs, ServerConfig};
pub use context::{DataContext, DryRunValidator, EngineError, FilesystemContext};
pub use error::{SessionError, SessionResult};
pub use expectation::{ExpectationSuite, RuleDescriptor, SuiteConfig};
pub use logging::{LoggingConfig, init_logging, shutdown_telemetry};
pub use server::build_router;
pub use session::{Session, SessionOptions, SessionState, SuiteStatus};
pub use shutdown::{ShutdownConfig, ShutdownCoordinator, ShutdownPhase};
pub use state::AppState;

use anyhow::Result;
use std::{future::IntoFuture, sync::Arc, time::Duration};
use tokio::{net::TcpListener, runtime::Runtime};

/// Time blocking sessions still get once [`run_server`] has returned.
pub const ABANDONED_SESSION_GRACE: Duration = Duration::from_secs(1);

pub fn build_runtime() -> std::io::Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("expectation-server")
        .build()
}

/// Stop `runtime` without waiting on blocking sessions beyond `grace`.
///
/// Dropping a runtime joins every `spawn_blocking` task, so a session that
/// outlived the drain timeout would otherwise hold the process open.
pub fn shutdown_runtime(runtime: Runtime, grace: Duration) {
    runtime.shutdown_timeout(grace);
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    let config = Arc::new(config);
    let state = AppState::new(config.clone());
    let coordinator = state.shutdown().clone();

    tracing::info!(
        batch_limit = config.batch_limit,
        default_root = ?config.default_root,
        "starting expectation server",
    );

    let router = build_router(state);
    let listener = TcpListener::bind(config.http_bind_address).await?;
    let actual_addr = listener.local_addr()?;
    tracing::info!(transport = "http", bind = %actual_addr, "listening");

    let shutdown_coordinator = coordinator.clone();
    let server_future = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_coordinator.wait_for_signal().await;
        })
        .into_future();
    tokio::pin!(server_future);

    let token = coordinator.token();
    let server_result = tokio::select! {
        result = &mut server_future => result,
        _ = token.cancelled() => {
            // open connections keep being served; the drain phase bounds the wait
            let forced = tokio::select! {
                result = &mut server_future => Some(result),
                phase = coordinator.drain() => (phase == ShutdownPhase::Forced).then_some(Ok(())),
            };
            match forced {
                Some(result) => result,
                None => (&mut server_future).await,
            }
        }
    };

    tracing::info!("server stopped");

    server_result.map_err(anyhow::Error::from)
}
