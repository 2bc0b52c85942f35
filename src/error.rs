//! Error taxonomy for validation sessions.
//!
//! Engine failures keep their own type ([`EngineError`]) so callers can tell
//! the recoverable context class apart from store and render failures. Every
//! session-level operation returns [`SessionError`].

use crate::context::EngineError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::path::PathBuf;
use thiserror::Error;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Datasource or suite configuration is missing a required key or is malformed
    #[error("invalid {document} configuration: {message}")]
    Config {
        document: &'static str,
        message: String,
    },

    /// Failure raised by the data context
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Report resolution was attempted before any run and without an explicit path
    #[error("no report available: run the checkpoint first or pass an explicit report path")]
    MissingReport,

    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The blocking worker running the session panicked or was cancelled
    #[error("session task failed: {0}")]
    Task(String),
}

impl SessionError {
    pub fn datasource(message: impl Into<String>) -> Self {
        SessionError::Config {
            document: "datasource",
            message: message.into(),
        }
    }

    pub fn suite(message: impl Into<String>) -> Self {
        SessionError::Config {
            document: "suite",
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SessionError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, SessionError::Config { .. })
    }

    /// Category label used in log records
    pub fn category(&self) -> &'static str {
        match self {
            SessionError::Config { .. } => "config_error",
            SessionError::Engine(err) if err.is_context_error() => "engine_context_error",
            SessionError::Engine(_) => "engine_error",
            SessionError::MissingReport => "missing_report",
            SessionError::Io { .. } => "io_error",
            SessionError::Task(_) => "server_error",
        }
    }
}

/// Every failure surfaces as an unstructured 500; callers cannot tell causes
/// apart from the response alone.
impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        tracing::error!(category = self.category(), error = %self, "expectation run failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_distinguish_context_errors() {
        let context = SessionError::from(EngineError::context("suite exists"));
        assert_eq!(context.category(), "engine_context_error");

        let other = SessionError::from(EngineError::Validator("boom".to_string()));
        assert_eq!(other.category(), "engine_error");

        assert_eq!(SessionError::MissingReport.category(), "missing_report");
        assert!(SessionError::datasource("missing key").is_config());
    }

    #[test]
    fn responses_are_plain_internal_errors() {
        let response = SessionError::MissingReport.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
