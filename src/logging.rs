//! Log and trace output for the expectation server.
//!
//! Every `POST /run_expectation` runs inside a [`session_span`]; the span
//! carries a request id and, once the session is configured, the derived
//! suite and checkpoint names, so every record emitted by the session and
//! its data context can be grouped per request.

use anyhow::{Context, Result};
use opentelemetry::{KeyValue, trace::TracerProvider as _};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    trace::{Sampler, TracerProvider},
};
use std::env;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing::field::Empty;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, fmt, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt,
};

const SERVICE_NAME: &str = "expectation-server";
const LOG_FILE_PREFIX: &str = "expectation-server.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// Daily-rolling files below the given directory
    File(PathBuf),
}

/// OTLP export of session spans.
#[derive(Debug, Clone, PartialEq)]
pub struct OtlpConfig {
    pub endpoint: String,
    pub sampling_ratio: f64,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub output: LogOutput,
    /// `EnvFilter` directives
    pub filter: String,
    pub environment: String,
    pub otlp: Option<OtlpConfig>,
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from `lookup`, which resolves variable names
    /// the way the process environment would.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());
        let production = matches!(environment.as_str(), "production" | "prod");

        let format = match lookup("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            Some("pretty") => LogFormat::Pretty,
            _ if production => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let output = match lookup("LOG_OUTPUT").as_deref() {
            Some("stdout") => LogOutput::Stdout,
            Some("file") => LogOutput::File(
                lookup("LOG_DIR").map_or_else(|| PathBuf::from("logs"), PathBuf::from),
            ),
            _ => LogOutput::Stderr,
        };

        let filter = lookup("RUST_LOG").unwrap_or_else(|| default_filter(production).to_string());

        let otlp = lookup("OTEL_EXPORTER_OTLP_ENDPOINT").map(|endpoint| OtlpConfig {
            endpoint,
            sampling_ratio: lookup("OTEL_SAMPLING_RATE")
                .and_then(|rate| rate.parse::<f64>().ok())
                .map_or(if production { 0.1 } else { 1.0 }, |rate| rate.clamp(0.0, 1.0)),
            timeout: Duration::from_secs(
                lookup("OTEL_EXPORTER_OTLP_TIMEOUT")
                    .and_then(|secs| secs.parse().ok())
                    .unwrap_or(10),
            ),
        });

        Self {
            format,
            output,
            filter,
            environment,
            otlp,
        }
    }
}

/// Session and context records at debug in development; engine dependencies
/// stay at warn.
fn default_filter(production: bool) -> &'static str {
    if production {
        "info,hyper=warn,tower=warn,tera=warn"
    } else {
        "info,expectation_server=debug,hyper=warn,tower=warn,tera=warn"
    }
}

/// Install the global subscriber. Hold the guard until exit so buffered
/// records reach the writer.
pub fn init_logging(config: LoggingConfig) -> Result<WorkerGuard> {
    let filter = EnvFilter::try_new(&config.filter)
        .with_context(|| format!("invalid log filter {:?}", config.filter))?;

    let (writer, guard) = match &config.output {
        LogOutput::Stdout => tracing_appender::non_blocking(io::stdout()),
        LogOutput::Stderr => tracing_appender::non_blocking(io::stderr()),
        LogOutput::File(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {:?}", dir))?;
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX))
        }
    };

    // session spans are closed once per request; their close event carries the duration
    let fmt_layer = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(writer)
            .with_current_span(true)
            .with_span_list(false)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_writer(writer)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
    };

    let otel_layer = match config.otlp.as_ref().map(|otlp| otlp_provider(otlp, &config)) {
        Some(Ok(provider)) => Some(tracing_opentelemetry::layer().with_tracer(provider.tracer(SERVICE_NAME))),
        Some(Err(err)) => {
            eprintln!("OTLP export disabled: {err}");
            None
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()
        .context("a global subscriber is already installed")?;

    tracing::info!(
        environment = %config.environment,
        format = ?config.format,
        otlp = config.otlp.is_some(),
        "logging initialized"
    );
    Ok(guard)
}

fn otlp_provider(
    otlp: &OtlpConfig,
    config: &LoggingConfig,
) -> Result<TracerProvider, opentelemetry::trace::TraceError> {
    let sampler = if otlp.sampling_ratio >= 1.0 {
        Sampler::AlwaysOn
    } else {
        Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(otlp.sampling_ratio)))
    };
    let resource = Resource::new([
        KeyValue::new(
            opentelemetry_semantic_conventions::resource::SERVICE_NAME,
            SERVICE_NAME,
        ),
        KeyValue::new(
            opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
            env!("CARGO_PKG_VERSION"),
        ),
        KeyValue::new(
            opentelemetry_semantic_conventions::resource::DEPLOYMENT_ENVIRONMENT,
            config.environment.clone(),
        ),
    ]);

    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(&otlp.endpoint)
                .with_timeout(otlp.timeout),
        )
        .with_trace_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(sampler)
                .with_resource(resource),
        )
        .install_batch(opentelemetry_sdk::runtime::Tokio)
}

/// Flush exported spans; call from inside the runtime before it stops.
pub fn shutdown_telemetry() {
    opentelemetry::global::shutdown_tracer_provider();
}

/// Warn when an operation exceeds `threshold_ms`, otherwise record it at debug.
#[macro_export]
macro_rules! log_slow_operation {
    ($duration:expr, $threshold_ms:expr, $($arg:tt)*) => {{
        let duration_ms = $duration.as_millis() as u64;
        if duration_ms > $threshold_ms {
            tracing::warn!(duration_ms, threshold_ms = $threshold_ms, $($arg)*);
        } else {
            tracing::debug!(duration_ms, $($arg)*);
        }
    }};
}

/// Span wrapping one HTTP-triggered validation session.
///
/// `suite` and `checkpoint` start empty and are filled by
/// [`record_session_names`] once the datasource has been parsed.
pub fn session_span(root: &str) -> tracing::Span {
    tracing::info_span!(
        "validation_session",
        request_id = %uuid::Uuid::new_v4(),
        root = root,
        suite = Empty,
        checkpoint = Empty,
    )
}

pub fn record_session_names(span: &tracing::Span, suite: &str, checkpoint: &str) {
    span.record("suite", suite);
    span.record("checkpoint", checkpoint);
}
