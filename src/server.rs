//! HTTP surface: a welcome route and the expectation-run trigger.

use crate::error::{SessionError, SessionResult};
use crate::expectation::SuiteConfig;
use crate::logging::{record_session_names, session_span};
use crate::session::{Session, SessionOptions, SuiteStatus};
use crate::state::AppState;
use axum::{
    Json, Router,
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Instant;
use tokio::task;
use tracing::{Instrument, info, warn};

pub const WELCOME_MESSAGE: &str = "Welcome to GE for datahub";
pub const RUN_COMPLETED_MESSAGE: &str = "expectation run completed";

const SLOW_REQUEST_THRESHOLD_MS: u64 = 10_000;

#[derive(Debug, Clone, Deserialize)]
pub struct RunExpectationRequest {
    /// Datasource configuration document as YAML text
    pub datasource_yaml: String,
    pub expectation_config: serde_json::Value,
    pub root_directory: String,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(welcome_handler))
        .route("/run_expectation", post(run_expectation_handler))
        .with_state(state)
}

pub async fn welcome_handler() -> &'static str {
    WELCOME_MESSAGE
}

pub async fn run_expectation_handler(
    State(state): State<AppState>,
    Json(request): Json<RunExpectationRequest>,
) -> Response {
    let _in_flight = state.shutdown().track_request();
    let span = session_span(&request.root_directory);

    let started = Instant::now();
    let outcome = run_expectation(&state, request).instrument(span).await;
    crate::log_slow_operation!(
        started.elapsed(),
        SLOW_REQUEST_THRESHOLD_MS,
        success = outcome.is_ok(),
        "run_expectation request"
    );

    match outcome {
        Ok(()) => RUN_COMPLETED_MESSAGE.into_response(),
        Err(err) => err.into_response(),
    }
}

async fn run_expectation(state: &AppState, request: RunExpectationRequest) -> SessionResult<()> {
    let RunExpectationRequest {
        datasource_yaml,
        expectation_config,
        root_directory,
    } = request;

    let root = state.config().resolve_root(&root_directory)?;
    let options = SessionOptions {
        batch_limit: state.config().batch_limit,
    };

    let span = tracing::Span::current();
    task::spawn_blocking(move || {
        let _entered = span.enter();
        execute_session(root, &datasource_yaml, expectation_config, options)
    })
    .await
    .map_err(|err| SessionError::Task(err.to_string()))?
}

fn execute_session(
    root: PathBuf,
    datasource_yaml: &str,
    expectation_config: serde_json::Value,
    options: SessionOptions,
) -> SessionResult<()> {
    let suite_config = SuiteConfig::from_value(expectation_config)?;
    let mut session = Session::initialize(&root, datasource_yaml, suite_config, options)?;
    record_session_names(
        &tracing::Span::current(),
        session.suite_name().as_str(),
        session.checkpoint_name().as_str(),
    );

    if let SuiteStatus::Rejected(err) = session.ensure_suite()? {
        warn!(error = %err, "continuing with the previously persisted suite");
    }

    let result = session.run()?;
    info!(
        checkpoint = %session.checkpoint_name(),
        run_name = %result.run_id.run_name,
        success = result.success,
        report = ?session.last_report_path(),
        "expectation run completed"
    );
    Ok(())
}
