use crate::checkpoint::BatchRequest;
use crate::context::EngineResult;
use crate::expectation::ExpectationSuite;
use crate::validation::ExpectationValidationResult;
use serde_json::{Map, Value};

/// Evaluates a suite against one batch of data.
pub trait BatchValidator: Send + Sync {
    fn name(&self) -> &str;

    fn validate(
        &self,
        batch: &BatchRequest,
        suite: &ExpectationSuite,
    ) -> EngineResult<Vec<ExpectationValidationResult>>;
}

/// Records every expectation as passing without touching the data.
///
/// Used until an execution backend is configured; each result is marked with
/// `dry_run: true`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunValidator;

impl BatchValidator for DryRunValidator {
    fn name(&self) -> &str {
        "dry_run"
    }

    fn validate(
        &self,
        batch: &BatchRequest,
        suite: &ExpectationSuite,
    ) -> EngineResult<Vec<ExpectationValidationResult>> {
        Ok(suite
            .expectations
            .iter()
            .map(|rule| {
                let mut result = Map::new();
                result.insert("dry_run".to_string(), Value::Bool(true));
                result.insert("batch_limit".to_string(), Value::from(batch.limit));
                ExpectationValidationResult {
                    success: true,
                    expectation_config: rule.clone(),
                    result,
                    exception_info: None,
                }
            })
            .collect())
    }
}
