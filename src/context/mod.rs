//! Data context: the engine seam a validation session drives.
//!
//! A [`DataContext`] owns the persisted suites, checkpoints, registered
//! datasources and rendered data docs below one root directory. Expectation
//! evaluation itself is delegated to a [`BatchValidator`].

mod docs;
mod filesystem;
mod validator;

pub use docs::DocsRenderer;
pub use filesystem::{
    CHECKPOINTS_DIR, DATA_DOCS_DIR, EXPECTATIONS_DIR, FilesystemContext, PROJECT_FILE,
    VALIDATIONS_DIR,
};
pub use validator::{BatchValidator, DryRunValidator};

use crate::checkpoint::CheckpointConfig;
use crate::expectation::ExpectationSuite;
use crate::naming::{CheckpointName, SuiteName};
use crate::validation::CheckpointResult;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Rejected by the context itself: unknown or conflicting names, invalid
    /// identifiers, unregistered datasources
    #[error("data context error: {0}")]
    Context(String),

    #[error("store operation on {path:?} failed: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize or parse {what}: {message}")]
    Serialization { what: String, message: String },

    #[error("failed to render data docs: {0}")]
    Render(#[from] tera::Error),

    #[error("batch validation failed: {0}")]
    Validator(String),
}

impl EngineError {
    pub fn context(message: impl Into<String>) -> Self {
        EngineError::Context(message.into())
    }

    pub fn store(path: impl Into<PathBuf>, source: io::Error) -> Self {
        EngineError::Store {
            path: path.into(),
            source,
        }
    }

    pub fn serialization(what: impl Into<String>, err: impl std::fmt::Display) -> Self {
        EngineError::Serialization {
            what: what.into(),
            message: err.to_string(),
        }
    }

    pub fn is_context_error(&self) -> bool {
        matches!(self, EngineError::Context(_))
    }
}

pub trait DataContext: Send {
    fn root_directory(&self) -> &Path;

    /// Structural check of a datasource document before registration.
    fn test_datasource_config(&self, raw: &serde_yaml::Value) -> EngineResult<()>;

    fn add_datasource(&mut self, name: &str, raw: &serde_yaml::Value) -> EngineResult<()>;

    /// Create and persist an empty suite. An existing suite is replaced when
    /// `overwrite_existing` is set and rejected otherwise.
    fn create_expectation_suite(
        &mut self,
        name: &SuiteName,
        overwrite_existing: bool,
    ) -> EngineResult<ExpectationSuite>;

    fn save_expectation_suite(&mut self, suite: &ExpectationSuite) -> EngineResult<()>;

    fn get_expectation_suite(&self, name: &SuiteName) -> EngineResult<ExpectationSuite>;

    fn delete_expectation_suite(&mut self, name: &SuiteName) -> EngineResult<()>;

    /// Register a checkpoint, replacing any previous one with the same name.
    fn add_checkpoint(&mut self, config: CheckpointConfig) -> EngineResult<()>;

    fn run_checkpoint(&mut self, name: &CheckpointName) -> EngineResult<CheckpointResult>;
}
