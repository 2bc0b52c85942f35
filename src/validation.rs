//! Checkpoint run results.

use crate::checkpoint::BatchRequest;
use crate::expectation::RuleDescriptor;
use crate::naming::{CheckpointName, SuiteName};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

pub const LOCAL_SITE: &str = "local_site";
const FILE_SCHEME: &str = "file://";
const RUN_TIME_FORMAT: &str = "%Y%m%dT%H%M%S%.6fZ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentifier {
    pub run_name: String,
    pub run_time: DateTime<Utc>,
}

impl RunIdentifier {
    /// Name the run by formatting `run_time` with the checkpoint's template.
    pub fn from_template(template: &str, run_time: DateTime<Utc>) -> Self {
        Self {
            run_name: run_time.format(template).to_string(),
            run_time,
        }
    }

    /// Path-safe rendering of the run time.
    pub fn run_time_token(&self) -> String {
        self.run_time.format(RUN_TIME_FORMAT).to_string()
    }
}

/// Outcome of a single expectation against a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectationValidationResult {
    pub success: bool,
    pub expectation_config: RuleDescriptor,
    #[serde(default)]
    pub result: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_info: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationStatistics {
    pub evaluated_expectations: usize,
    pub successful_expectations: usize,
    pub unsuccessful_expectations: usize,
    pub success_percent: Option<f64>,
}

impl ValidationStatistics {
    pub fn from_results(results: &[ExpectationValidationResult]) -> Self {
        let evaluated = results.len();
        let successful = results.iter().filter(|result| result.success).count();
        let success_percent = (evaluated > 0).then(|| successful as f64 / evaluated as f64 * 100.0);
        Self {
            evaluated_expectations: evaluated,
            successful_expectations: successful,
            unsuccessful_expectations: evaluated - successful,
            success_percent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationMeta {
    pub expectation_suite_name: SuiteName,
    pub run_id: RunIdentifier,
    pub batch_request: BatchRequest,
    pub validation_time: DateTime<Utc>,
}

/// Result of validating one batch against one suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteValidationResult {
    pub success: bool,
    pub results: Vec<ExpectationValidationResult>,
    pub statistics: ValidationStatistics,
    pub meta: ValidationMeta,
}

impl SuiteValidationResult {
    pub fn new(results: Vec<ExpectationValidationResult>, meta: ValidationMeta) -> Self {
        let statistics = ValidationStatistics::from_results(&results);
        Self {
            success: statistics.unsuccessful_expectations == 0,
            results,
            statistics,
            meta,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionsResults {
    /// Rendered page location per data docs site
    #[serde(default)]
    pub update_data_docs: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub validation_result: SuiteValidationResult,
    pub actions_results: ActionsResults,
}

impl RunResult {
    pub fn local_site_url(&self) -> Option<&str> {
        self.actions_results
            .update_data_docs
            .get(LOCAL_SITE)
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointResult {
    pub run_id: RunIdentifier,
    pub checkpoint_name: CheckpointName,
    pub success: bool,
    /// Keyed by validation result identifier, in execution order
    pub run_results: IndexMap<String, RunResult>,
}

impl CheckpointResult {
    /// Local report path of the last run result, scheme stripped.
    pub fn last_report_path(&self) -> Option<PathBuf> {
        self.run_results
            .values()
            .last()
            .and_then(RunResult::local_site_url)
            .map(|url| PathBuf::from(strip_file_scheme(url)))
    }
}

pub fn strip_file_scheme(url: &str) -> &str {
    url.strip_prefix(FILE_SCHEME).unwrap_or(url)
}
