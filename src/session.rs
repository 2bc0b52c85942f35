//! Validation session lifecycle.
//!
//! A [`Session`] binds one datasource configuration, one suite configuration
//! and one data context. Its lifecycle is
//!
//! ```text
//! Configured -> SuiteEnsured -> CheckpointEnsured -> Validated
//! ```
//!
//! and [`Session::run`] may be repeated from `Validated`; every run rebuilds
//! the batch request and re-registers the checkpoint under the same name.
//!
//! The state records the furthest step reached, not a required order.
//! Checkpoints may be ensured (and runs started) straight from `Configured`,
//! in which case the run validates whatever suite the data context already
//! holds under the derived name; a missing suite surfaces as a context error
//! from the run.

use crate::checkpoint::{BatchRequest, CheckpointConfig, DEFAULT_BATCH_LIMIT};
use crate::context::{DATA_DOCS_DIR, DataContext, EXPECTATIONS_DIR, EngineError, FilesystemContext};
use crate::datasource::DatasourceConfig;
use crate::error::{SessionError, SessionResult};
use crate::expectation::{ExpectationSuite, SuiteConfig};
use crate::naming::{self, CheckpointName, SuiteName};
use crate::validation::CheckpointResult;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use strum::{AsRefStr, Display};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const SLOW_RUN_THRESHOLD_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    Configured,
    SuiteEnsured,
    CheckpointEnsured,
    Validated,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Row limit placed on every batch request
    pub batch_limit: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }
}

/// Outcome of [`Session::ensure_suite`].
#[derive(Debug)]
pub enum SuiteStatus {
    /// Suite persisted with every configured rule
    Ready(ExpectationSuite),
    /// The data context refused the suite; rules saved before the refusal stay
    /// persisted
    Rejected(EngineError),
}

impl SuiteStatus {
    pub fn suite(&self) -> Option<&ExpectationSuite> {
        match self {
            SuiteStatus::Ready(suite) => Some(suite),
            SuiteStatus::Rejected(_) => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SuiteStatus::Ready(_))
    }
}

pub struct Session {
    datasource: DatasourceConfig,
    suite_config: SuiteConfig,
    suite_name: SuiteName,
    checkpoint_name: CheckpointName,
    options: SessionOptions,
    context: Box<dyn DataContext>,
    suite: Option<ExpectationSuite>,
    checkpoint: Option<CheckpointConfig>,
    last_report: Option<PathBuf>,
    state: SessionState,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("datasource", &self.datasource)
            .field("suite_config", &self.suite_config)
            .field("suite_name", &self.suite_name)
            .field("checkpoint_name", &self.checkpoint_name)
            .field("options", &self.options)
            .field("suite", &self.suite)
            .field("checkpoint", &self.checkpoint)
            .field("last_report", &self.last_report)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Open a filesystem data context at `root` and register the datasource.
    pub fn initialize(
        root: impl AsRef<Path>,
        datasource_yaml: &str,
        suite_config: SuiteConfig,
        options: SessionOptions,
    ) -> SessionResult<Self> {
        let datasource = DatasourceConfig::from_yaml(datasource_yaml)?;
        let context = FilesystemContext::open(root)?;
        Self::bind(Box::new(context), datasource, suite_config, options)
    }

    /// Bind a session to an already opened data context.
    pub fn with_context(
        context: Box<dyn DataContext>,
        datasource_yaml: &str,
        suite_config: SuiteConfig,
        options: SessionOptions,
    ) -> SessionResult<Self> {
        let datasource = DatasourceConfig::from_yaml(datasource_yaml)?;
        Self::bind(context, datasource, suite_config, options)
    }

    fn bind(
        mut context: Box<dyn DataContext>,
        datasource: DatasourceConfig,
        suite_config: SuiteConfig,
        options: SessionOptions,
    ) -> SessionResult<Self> {
        let suite_name = naming::suite_name(datasource.source_name(), &suite_config.suite_label);
        let checkpoint_name =
            naming::checkpoint_name(datasource.source_name(), datasource.asset_name());

        context
            .test_datasource_config(datasource.raw())
            .map_err(|err| match err {
                EngineError::Context(message) => SessionError::datasource(message),
                other => SessionError::Engine(other),
            })?;
        context.add_datasource(datasource.registration_name(), datasource.raw())?;

        info!(
            root = %context.root_directory().display(),
            datasource = datasource.registration_name(),
            suite = %suite_name,
            checkpoint = %checkpoint_name,
            "validation session configured"
        );

        Ok(Self {
            datasource,
            suite_config,
            suite_name,
            checkpoint_name,
            options,
            context,
            suite: None,
            checkpoint: None,
            last_report: None,
            state: SessionState::Configured,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn suite_name(&self) -> &SuiteName {
        &self.suite_name
    }

    pub fn checkpoint_name(&self) -> &CheckpointName {
        &self.checkpoint_name
    }

    pub fn datasource(&self) -> &DatasourceConfig {
        &self.datasource
    }

    pub fn context(&self) -> &dyn DataContext {
        self.context.as_ref()
    }

    pub fn context_mut(&mut self) -> &mut dyn DataContext {
        self.context.as_mut()
    }

    /// Suite handle from the last successful [`Session::ensure_suite`].
    pub fn suite(&self) -> Option<&ExpectationSuite> {
        self.suite.as_ref()
    }

    pub fn checkpoint(&self) -> Option<&CheckpointConfig> {
        self.checkpoint.as_ref()
    }

    pub fn last_report_path(&self) -> Option<&Path> {
        self.last_report.as_deref()
    }

    /// Fresh batch request over the configured asset.
    pub fn batch_request(&self) -> BatchRequest {
        BatchRequest::for_datasource(&self.datasource, self.options.batch_limit)
    }

    /// Create (or fully replace) the suite and add every configured rule in
    /// order, persisting after each addition.
    ///
    /// A context-class rejection is logged and reported as
    /// [`SuiteStatus::Rejected`]; every other failure is returned as an error.
    pub fn ensure_suite(&mut self) -> SessionResult<SuiteStatus> {
        match self.build_suite() {
            Ok(suite) => {
                debug!(suite = %self.suite_name, rules = suite.len(), "expectation suite ready");
                self.suite = Some(suite.clone());
                self.advance(SessionState::SuiteEnsured);
                Ok(SuiteStatus::Ready(suite))
            }
            Err(err) if err.is_context_error() => {
                warn!(suite = %self.suite_name, error = %err, "data context rejected expectation suite");
                self.suite = None;
                Ok(SuiteStatus::Rejected(err))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn build_suite(&mut self) -> Result<ExpectationSuite, EngineError> {
        let mut suite = self
            .context
            .create_expectation_suite(&self.suite_name, true)?;
        for rule in &self.suite_config.rules {
            suite.add_expectation(rule.clone());
            self.context.save_expectation_suite(&suite)?;
        }
        Ok(suite)
    }

    /// Register the checkpoint pinning the suite to a fresh batch request.
    ///
    /// Does not require [`Session::ensure_suite`] in this session; see the
    /// module docs.
    pub fn ensure_checkpoint(&mut self) -> SessionResult<CheckpointConfig> {
        let config = CheckpointConfig::simple(
            self.checkpoint_name.clone(),
            self.suite_name.clone(),
            self.batch_request(),
        );
        self.context.add_checkpoint(config.clone())?;
        self.checkpoint = Some(config.clone());
        self.advance(SessionState::CheckpointEnsured);
        Ok(config)
    }

    /// Run the checkpoint and remember the report of its last validation.
    pub fn run(&mut self) -> SessionResult<CheckpointResult> {
        self.ensure_checkpoint()?;

        let started = Instant::now();
        let result = self.context.run_checkpoint(&self.checkpoint_name)?;
        crate::log_slow_operation!(
            started.elapsed(),
            SLOW_RUN_THRESHOLD_MS,
            checkpoint = %self.checkpoint_name,
            success = result.success,
            "checkpoint run"
        );

        if let Some(path) = result.last_report_path() {
            self.last_report = Some(path);
        }
        self.state = SessionState::Validated;
        Ok(result)
    }

    /// Read the report at `path`, or the report of the last run.
    pub fn resolve_report(&self, path: Option<&Path>) -> SessionResult<String> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| self.last_report.clone())
            .ok_or(SessionError::MissingReport)?;
        fs::read_to_string(&path).map_err(|err| SessionError::io(path, err))
    }

    pub fn expectation_suite(&self) -> SessionResult<ExpectationSuite> {
        Ok(self.context.get_expectation_suite(&self.suite_name)?)
    }

    pub fn delete_expectation_suite(&mut self) -> SessionResult<()> {
        self.context.delete_expectation_suite(&self.suite_name)?;
        self.suite = None;
        Ok(())
    }

    /// Location of the rendered suite page under the storage root.
    pub fn expectation_report_path(&self) -> PathBuf {
        self.context
            .root_directory()
            .join(DATA_DOCS_DIR)
            .join(EXPECTATIONS_DIR)
            .join(format!("{}.html", self.suite_name.docs_path()))
    }

    pub fn render_expectation_report(&self) -> SessionResult<String> {
        let path = self.expectation_report_path();
        fs::read_to_string(&path).map_err(|err| SessionError::io(path, err))
    }

    /// Copy the whole storage root into `target`; returns the number of files copied.
    pub fn backup_to(&self, target: impl AsRef<Path>) -> SessionResult<usize> {
        let source = self.context.root_directory();
        let target = target.as_ref();
        let mut copied = 0;

        for entry in WalkDir::new(source) {
            let entry = entry.map_err(|err| {
                let path = err.path().unwrap_or(source).to_path_buf();
                SessionError::io(path, std::io::Error::other(err))
            })?;
            let relative = entry
                .path()
                .strip_prefix(source)
                .unwrap_or_else(|_| entry.path());
            let destination = target.join(relative);

            if entry.file_type().is_dir() {
                fs::create_dir_all(&destination)
                    .map_err(|err| SessionError::io(&destination, err))?;
            } else if entry.file_type().is_file() {
                fs::copy(entry.path(), &destination)
                    .map_err(|err| SessionError::io(&destination, err))?;
                copied += 1;
            }
        }

        info!(
            source = %source.display(),
            target = %target.display(),
            files = copied,
            "backed up data context"
        );
        Ok(copied)
    }

    fn advance(&mut self, next: SessionState) {
        if next > self.state {
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expectation::RuleDescriptor;

    const DATASOURCE: &str =
        "execution_engine: {credentials: {database: db1}}\ndata_connectors: {c: {assets: {t1: {}}}}\n";

    #[test]
    fn state_advances_but_never_regresses() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::initialize(
            dir.path(),
            DATASOURCE,
            SuiteConfig::new("s1", vec![RuleDescriptor::new("expect_column_to_exist")]),
            SessionOptions::default(),
        )
        .unwrap();
        assert_eq!(session.state(), SessionState::Configured);

        session.ensure_suite().unwrap();
        assert_eq!(session.state(), SessionState::SuiteEnsured);

        session.run().unwrap();
        assert_eq!(session.state(), SessionState::Validated);

        session.ensure_suite().unwrap();
        assert_eq!(session.state(), SessionState::Validated);
        assert_eq!(session.state().to_string(), "validated");
    }

    #[test]
    fn batch_request_uses_configured_limit() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::initialize(
            dir.path(),
            DATASOURCE,
            SuiteConfig::new("s1", Vec::new()),
            SessionOptions { batch_limit: 25 },
        )
        .unwrap();
        let batch = session.batch_request();
        assert_eq!(batch.limit, 25);
        assert_eq!(batch.datasource_name, "db1");
        assert_eq!(batch.data_asset_name, "t1");
    }

    #[test]
    fn malformed_datasource_fails_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("never-created");
        let err = match Session::initialize(
            &root,
            "data_connectors: {}\n",
            SuiteConfig::new("s1", Vec::new()),
            SessionOptions::default(),
        ) {
            Ok(_) => panic!("expected config error"),
            Err(err) => err,
        };
        assert!(err.is_config());
        assert!(!root.exists());
    }
}
