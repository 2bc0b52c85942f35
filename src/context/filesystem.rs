//! Data context persisted as plain files under one root directory.

use super::{BatchValidator, DataContext, DocsRenderer, DryRunValidator, EngineError, EngineResult};
use crate::checkpoint::{BatchRequest, CheckpointConfig};
use crate::expectation::ExpectationSuite;
use crate::naming::{CheckpointName, SuiteName};
use crate::validation::{
    ActionsResults, CheckpointResult, LOCAL_SITE, RunIdentifier, RunResult, SuiteValidationResult,
    ValidationMeta,
};
use chrono::Utc;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use walkdir::WalkDir;

pub const PROJECT_FILE: &str = "great_expectations.yml";
pub const EXPECTATIONS_DIR: &str = "expectations";
pub const CHECKPOINTS_DIR: &str = "checkpoints";
pub const VALIDATIONS_DIR: &str = "uncommitted/validations";
pub const DATA_DOCS_DIR: &str = "uncommitted/data_docs/local_site";

const PROJECT_CONFIG_VERSION: f64 = 3.0;

static UNSAFE_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[/\\\x00"<>]"#).expect("static regex is valid"));

#[derive(Debug, Serialize, Deserialize)]
struct ProjectConfig {
    config_version: f64,
    #[serde(default)]
    datasources: IndexMap<String, serde_yaml::Value>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            config_version: PROJECT_CONFIG_VERSION,
            datasources: IndexMap::new(),
        }
    }
}

pub struct FilesystemContext {
    root: PathBuf,
    project: ProjectConfig,
    validator: Arc<dyn BatchValidator>,
    docs: DocsRenderer,
}

impl FilesystemContext {
    /// Open the context rooted at `root`, creating the layout when missing.
    pub fn open(root: impl AsRef<Path>) -> EngineResult<Self> {
        Self::with_validator(root, Arc::new(DryRunValidator))
    }

    pub fn with_validator(
        root: impl AsRef<Path>,
        validator: Arc<dyn BatchValidator>,
    ) -> EngineResult<Self> {
        let root = root.as_ref();
        for dir in [EXPECTATIONS_DIR, CHECKPOINTS_DIR, VALIDATIONS_DIR, DATA_DOCS_DIR] {
            let path = root.join(dir);
            fs::create_dir_all(&path).map_err(|err| EngineError::store(&path, err))?;
        }
        let root = fs::canonicalize(root).map_err(|err| EngineError::store(root, err))?;

        let project_path = root.join(PROJECT_FILE);
        let project = if project_path.exists() {
            read_yaml(&project_path, "project config")?
        } else {
            let project = ProjectConfig::default();
            write_yaml(&project_path, &project, "project config")?;
            project
        };

        debug!(
            root = %root.display(),
            datasources = project.datasources.len(),
            validator = validator.name(),
            "opened filesystem data context"
        );

        Ok(Self {
            root,
            project,
            validator,
            docs: DocsRenderer::new()?,
        })
    }

    pub fn datasource_names(&self) -> impl Iterator<Item = &str> {
        self.project.datasources.keys().map(String::as_str)
    }

    pub fn data_docs_root(&self) -> PathBuf {
        self.root.join(DATA_DOCS_DIR)
    }

    /// Rendered page for a suite below the data docs site.
    pub fn suite_docs_path(&self, name: &SuiteName) -> PathBuf {
        self.data_docs_root()
            .join(EXPECTATIONS_DIR)
            .join(format!("{}.html", name.docs_path()))
    }

    fn suite_path(&self, name: &SuiteName) -> PathBuf {
        self.root
            .join(EXPECTATIONS_DIR)
            .join(format!("{}.json", name.docs_path()))
    }

    fn checkpoint_path(&self, name: &CheckpointName) -> PathBuf {
        self.root
            .join(CHECKPOINTS_DIR)
            .join(format!("{}.yml", name.as_str()))
    }

    fn save_project(&self) -> EngineResult<()> {
        write_yaml(&self.root.join(PROJECT_FILE), &self.project, "project config")
    }

    fn write_suite(&self, suite: &ExpectationSuite) -> EngineResult<()> {
        let path = self.suite_path(suite.name());
        let body = serde_json::to_string_pretty(suite)
            .map_err(|err| EngineError::serialization("expectation suite", err))?;
        write_file(&path, body)?;

        let html = self.docs.render_suite(suite)?;
        write_file(&self.suite_docs_path(suite.name()), html)?;
        self.rebuild_index()
    }

    fn validate_batch(
        &self,
        suite: &ExpectationSuite,
        run_id: &RunIdentifier,
        batch_request: &BatchRequest,
    ) -> EngineResult<(String, RunResult)> {
        if !self
            .project
            .datasources
            .contains_key(&batch_request.datasource_name)
        {
            return Err(EngineError::context(format!(
                "datasource '{}' is not registered in this context",
                batch_request.datasource_name
            )));
        }

        let batch_id = batch_request.batch_id();
        ensure_safe_name("batch", &batch_id)?;

        let results = self.validator.validate(batch_request, suite)?;
        let meta = ValidationMeta {
            expectation_suite_name: suite.name().clone(),
            run_id: run_id.clone(),
            batch_request: batch_request.clone(),
            validation_time: Utc::now(),
        };
        let validation_result = SuiteValidationResult::new(results, meta);

        let run_dir = PathBuf::from(suite.name().docs_path())
            .join(&run_id.run_name)
            .join(run_id.run_time_token());

        let result_path = self
            .root
            .join(VALIDATIONS_DIR)
            .join(&run_dir)
            .join(format!("{batch_id}.json"));
        let body = serde_json::to_string_pretty(&validation_result)
            .map_err(|err| EngineError::serialization("validation result", err))?;
        write_file(&result_path, body)?;

        let page_path = self
            .data_docs_root()
            .join("validations")
            .join(&run_dir)
            .join(format!("{batch_id}.html"));
        write_file(&page_path, self.docs.render_validation(&validation_result)?)?;

        let mut actions_results = ActionsResults::default();
        actions_results
            .update_data_docs
            .insert(LOCAL_SITE.to_string(), format!("file://{}", page_path.display()));

        let key = format!(
            "ValidationResultIdentifier::{}/{}/{}/{}",
            suite.name(),
            run_id.run_name,
            run_id.run_time_token(),
            batch_id
        );
        Ok((
            key,
            RunResult {
                validation_result,
                actions_results,
            },
        ))
    }

    fn rebuild_index(&self) -> EngineResult<()> {
        let site = self.data_docs_root();
        let suites = list_pages(&site, EXPECTATIONS_DIR);
        let validations = list_pages(&site, "validations");
        let html = self.docs.render_index(&suites, &validations)?;
        write_file(&site.join("index.html"), html)
    }
}

impl DataContext for FilesystemContext {
    fn root_directory(&self) -> &Path {
        &self.root
    }

    fn test_datasource_config(&self, raw: &serde_yaml::Value) -> EngineResult<()> {
        for key in ["execution_engine", "data_connectors"] {
            match raw.get(key) {
                Some(value) if value.is_mapping() => {}
                Some(_) => {
                    return Err(EngineError::context(format!(
                        "datasource `{key}` must be a mapping"
                    )));
                }
                None => {
                    return Err(EngineError::context(format!(
                        "datasource is missing `{key}`"
                    )));
                }
            }
        }
        Ok(())
    }

    fn add_datasource(&mut self, name: &str, raw: &serde_yaml::Value) -> EngineResult<()> {
        ensure_safe_name("datasource", name)?;
        self.project
            .datasources
            .insert(name.to_string(), raw.clone());
        self.save_project()?;
        info!(datasource = name, root = %self.root.display(), "registered datasource");
        Ok(())
    }

    fn create_expectation_suite(
        &mut self,
        name: &SuiteName,
        overwrite_existing: bool,
    ) -> EngineResult<ExpectationSuite> {
        ensure_safe_name("expectation suite", name.as_str())?;
        if name.segments().any(str::is_empty) {
            return Err(EngineError::context(format!(
                "expectation suite name '{name}' contains an empty segment"
            )));
        }

        if self.suite_path(name).exists() && !overwrite_existing {
            return Err(EngineError::context(format!(
                "expectation suite '{name}' already exists; pass overwrite_existing to replace it"
            )));
        }

        let suite = ExpectationSuite::new(name.clone());
        self.write_suite(&suite)?;
        debug!(suite = %name, overwrite_existing, "created expectation suite");
        Ok(suite)
    }

    fn save_expectation_suite(&mut self, suite: &ExpectationSuite) -> EngineResult<()> {
        ensure_safe_name("expectation suite", suite.name().as_str())?;
        self.write_suite(suite)
    }

    fn get_expectation_suite(&self, name: &SuiteName) -> EngineResult<ExpectationSuite> {
        let path = self.suite_path(name);
        if !path.exists() {
            return Err(EngineError::context(format!(
                "expectation suite '{name}' not found"
            )));
        }
        let body = fs::read_to_string(&path).map_err(|err| EngineError::store(&path, err))?;
        serde_json::from_str(&body).map_err(|err| EngineError::serialization("expectation suite", err))
    }

    fn delete_expectation_suite(&mut self, name: &SuiteName) -> EngineResult<()> {
        let path = self.suite_path(name);
        if !path.exists() {
            return Err(EngineError::context(format!(
                "expectation suite '{name}' not found"
            )));
        }
        fs::remove_file(&path).map_err(|err| EngineError::store(&path, err))?;

        let page = self.suite_docs_path(name);
        if page.exists() {
            fs::remove_file(&page).map_err(|err| EngineError::store(&page, err))?;
        }
        self.rebuild_index()?;
        info!(suite = %name, "deleted expectation suite");
        Ok(())
    }

    fn add_checkpoint(&mut self, config: CheckpointConfig) -> EngineResult<()> {
        ensure_safe_name("checkpoint", config.name.as_str())?;
        if config.validations.is_empty() {
            return Err(EngineError::context(format!(
                "checkpoint '{}' has no validations",
                config.name
            )));
        }
        let path = self.checkpoint_path(&config.name);
        write_yaml(&path, &config, "checkpoint")?;
        debug!(checkpoint = %config.name, suite = %config.expectation_suite_name, "registered checkpoint");
        Ok(())
    }

    fn run_checkpoint(&mut self, name: &CheckpointName) -> EngineResult<CheckpointResult> {
        let path = self.checkpoint_path(name);
        if !path.exists() {
            return Err(EngineError::context(format!("checkpoint '{name}' not found")));
        }
        let config: CheckpointConfig = read_yaml(&path, "checkpoint")?;
        let suite = self.get_expectation_suite(&config.expectation_suite_name)?;
        let run_id = RunIdentifier::from_template(&config.run_name_template, Utc::now());

        let mut run_results = IndexMap::new();
        for validation in &config.validations {
            let (key, result) = self.validate_batch(&suite, &run_id, &validation.batch_request)?;
            run_results.insert(key, result);
        }
        self.rebuild_index()?;

        let success = run_results
            .values()
            .all(|result| result.validation_result.success);
        info!(
            checkpoint = %name,
            suite = %suite.name(),
            run_name = %run_id.run_name,
            success,
            validations = run_results.len(),
            "checkpoint run finished"
        );

        Ok(CheckpointResult {
            run_id,
            checkpoint_name: name.clone(),
            success,
            run_results,
        })
    }
}

fn ensure_safe_name(kind: &str, name: &str) -> EngineResult<()> {
    if name.trim().is_empty() {
        return Err(EngineError::context(format!("{kind} name cannot be empty")));
    }
    if UNSAFE_NAME_CHARS.is_match(name) {
        return Err(EngineError::context(format!(
            "{kind} name '{name}' contains a path separator or markup character"
        )));
    }
    Ok(())
}

fn list_pages(site: &Path, section: &str) -> Vec<String> {
    let mut pages: Vec<String> = WalkDir::new(site.join(section))
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "html"))
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(site)
                .ok()
                .map(|relative| relative.to_string_lossy().replace('\\', "/"))
        })
        .collect();
    pages.sort();
    pages
}

fn write_file(path: &Path, contents: impl AsRef<[u8]>) -> EngineResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| EngineError::store(parent, err))?;
    }
    fs::write(path, contents).map_err(|err| EngineError::store(path, err))
}

fn write_yaml<T: Serialize>(path: &Path, value: &T, what: &str) -> EngineResult<()> {
    let body = serde_yaml::to_string(value).map_err(|err| EngineError::serialization(what, err))?;
    write_file(path, body)
}

fn read_yaml<T: for<'de> Deserialize<'de>>(path: &Path, what: &str) -> EngineResult<T> {
    let body = fs::read_to_string(path).map_err(|err| EngineError::store(path, err))?;
    serde_yaml::from_str(&body).map_err(|err| EngineError::serialization(what, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expectation::RuleDescriptor;
    use crate::naming::{checkpoint_name, suite_name};

    fn datasource() -> serde_yaml::Value {
        serde_yaml::from_str(
            "execution_engine: {credentials: {database: db1}}\ndata_connectors: {c: {assets: {t1: {}}}}\n",
        )
        .unwrap()
    }

    fn batch() -> BatchRequest {
        BatchRequest {
            datasource_name: "db1".into(),
            data_connector_name: "c".into(),
            data_asset_name: "t1".into(),
            limit: 1000,
        }
    }

    #[test]
    fn open_creates_layout_and_project_file() {
        let dir = tempfile::tempdir().unwrap();
        let context = FilesystemContext::open(dir.path()).unwrap();
        assert!(dir.path().join(PROJECT_FILE).is_file());
        assert!(dir.path().join(DATA_DOCS_DIR).is_dir());
        assert!(context.root_directory().is_absolute());
    }

    #[test]
    fn datasources_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut context = FilesystemContext::open(dir.path()).unwrap();
        context.add_datasource("db1", &datasource()).unwrap();

        let reopened = FilesystemContext::open(dir.path()).unwrap();
        assert_eq!(reopened.datasource_names().collect::<Vec<_>>(), vec!["db1"]);
    }

    #[test]
    fn test_datasource_config_requires_sections() {
        let dir = tempfile::tempdir().unwrap();
        let context = FilesystemContext::open(dir.path()).unwrap();
        assert!(context.test_datasource_config(&datasource()).is_ok());

        let missing: serde_yaml::Value = serde_yaml::from_str("execution_engine: {}\n").unwrap();
        let err = context.test_datasource_config(&missing).unwrap_err();
        assert!(err.is_context_error());
    }

    #[test]
    fn create_without_overwrite_rejects_existing_suite() {
        let dir = tempfile::tempdir().unwrap();
        let mut context = FilesystemContext::open(dir.path()).unwrap();
        let name = suite_name("db1", "s1");

        context.create_expectation_suite(&name, false).unwrap();
        let err = context.create_expectation_suite(&name, false).unwrap_err();
        assert!(err.is_context_error());
        assert!(context.create_expectation_suite(&name, true).is_ok());
    }

    #[test]
    fn suite_names_with_separators_are_context_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut context = FilesystemContext::open(dir.path()).unwrap();
        let err = context
            .create_expectation_suite(&suite_name("db1", "../escape"), true)
            .unwrap_err();
        assert!(err.is_context_error());
    }

    #[test]
    fn suite_names_with_markup_are_context_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut context = FilesystemContext::open(dir.path()).unwrap();
        for label in ["s1\" onmouseover=\"alert(1)", "<script>"] {
            let err = context
                .create_expectation_suite(&suite_name("db1", label), true)
                .unwrap_err();
            assert!(err.is_context_error(), "{label} accepted");
        }
        let index = fs::read_to_string(context.data_docs_root().join("index.html")).unwrap_or_default();
        assert!(!index.contains("onmouseover"));
    }

    #[test]
    fn saved_suite_round_trips_and_renders() {
        let dir = tempfile::tempdir().unwrap();
        let mut context = FilesystemContext::open(dir.path()).unwrap();
        let name = suite_name("db1", "s1");
        let mut suite = context.create_expectation_suite(&name, true).unwrap();
        suite.add_expectation(RuleDescriptor::new("expect_column_to_exist").with_kwarg("column", "id"));
        context.save_expectation_suite(&suite).unwrap();

        assert_eq!(context.get_expectation_suite(&name).unwrap(), suite);
        assert!(context.suite_docs_path(&name).is_file());
        assert!(
            dir.path()
                .join(EXPECTATIONS_DIR)
                .join("db1/s1_expectation_suite.json")
                .is_file()
        );
    }

    #[test]
    fn delete_removes_suite_and_page() {
        let dir = tempfile::tempdir().unwrap();
        let mut context = FilesystemContext::open(dir.path()).unwrap();
        let name = suite_name("db1", "s1");
        context.create_expectation_suite(&name, true).unwrap();

        context.delete_expectation_suite(&name).unwrap();
        assert!(context.get_expectation_suite(&name).unwrap_err().is_context_error());
        assert!(!context.suite_docs_path(&name).exists());
        assert!(context.delete_expectation_suite(&name).unwrap_err().is_context_error());
    }

    #[test]
    fn run_checkpoint_writes_results_and_pages() {
        let dir = tempfile::tempdir().unwrap();
        let mut context = FilesystemContext::open(dir.path()).unwrap();
        context.add_datasource("db1", &datasource()).unwrap();
        let suite = suite_name("db1", "s1");
        context.create_expectation_suite(&suite, true).unwrap();
        let name = checkpoint_name("db1", "t1");
        context
            .add_checkpoint(CheckpointConfig::simple(name.clone(), suite, batch()))
            .unwrap();

        let result = context.run_checkpoint(&name).unwrap();
        assert!(result.success);
        assert_eq!(result.run_results.len(), 1);
        let report = result.last_report_path().unwrap();
        assert!(report.is_file());
        assert!(report.starts_with(context.data_docs_root()));
        assert!(context.data_docs_root().join("index.html").is_file());
    }

    #[test]
    fn run_requires_registered_datasource() {
        let dir = tempfile::tempdir().unwrap();
        let mut context = FilesystemContext::open(dir.path()).unwrap();
        let suite = suite_name("db1", "s1");
        context.create_expectation_suite(&suite, true).unwrap();
        let name = checkpoint_name("db1", "t1");
        context
            .add_checkpoint(CheckpointConfig::simple(name.clone(), suite, batch()))
            .unwrap();

        let err = context.run_checkpoint(&name).unwrap_err();
        assert!(err.is_context_error());
    }

    #[test]
    fn unknown_checkpoint_is_context_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut context = FilesystemContext::open(dir.path()).unwrap();
        let err = context
            .run_checkpoint(&checkpoint_name("db1", "missing"))
            .unwrap_err();
        assert!(err.is_context_error());
    }
}
