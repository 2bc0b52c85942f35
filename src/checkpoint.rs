//! Batch selection and checkpoint configuration.

use crate::datasource::DatasourceConfig;
use crate::naming::{CheckpointName, SuiteName};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BATCH_LIMIT: usize = 1000;
pub const CHECKPOINT_CLASS_NAME: &str = "SimpleCheckpoint";
pub const RUN_NAME_TEMPLATE: &str = "%Y%m%d-%H%M%S";

/// Selects the slice of an asset a checkpoint validates.
///
/// Built fresh for every validation call so each run observes the current
/// data snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub datasource_name: String,
    pub data_connector_name: String,
    pub data_asset_name: String,
    pub limit: usize,
}

impl BatchRequest {
    pub fn for_datasource(config: &DatasourceConfig, limit: usize) -> Self {
        Self {
            datasource_name: config.source_name().to_string(),
            data_connector_name: config.connector_name().to_string(),
            data_asset_name: config.asset_name().to_string(),
            limit,
        }
    }

    /// Stable identifier used in result keys and report paths.
    pub fn batch_id(&self) -> String {
        format!(
            "{}-{}-{}",
            self.datasource_name, self.data_connector_name, self.data_asset_name
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointValidation {
    pub batch_request: BatchRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    pub name: CheckpointName,
    pub config_version: f64,
    pub class_name: String,
    pub run_name_template: String,
    pub expectation_suite_name: SuiteName,
    pub validations: Vec<CheckpointValidation>,
}

impl CheckpointConfig {
    /// Pin one suite to one batch request.
    pub fn simple(name: CheckpointName, suite: SuiteName, batch_request: BatchRequest) -> Self {
        Self {
            name,
            config_version: 1.0,
            class_name: CHECKPOINT_CLASS_NAME.to_string(),
            run_name_template: RUN_NAME_TEMPLATE.to_string(),
            expectation_suite_name: suite,
            validations: vec![CheckpointValidation { batch_request }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::{checkpoint_name, suite_name};

    #[test]
    fn simple_checkpoint_pins_suite_and_batch() {
        let datasource = DatasourceConfig::from_yaml(
            "execution_engine: {credentials: {database: db1}}\ndata_connectors: {c: {assets: {t1: {}}}}\n",
        )
        .unwrap();
        let batch = BatchRequest::for_datasource(&datasource, DEFAULT_BATCH_LIMIT);
        let config = CheckpointConfig::simple(
            checkpoint_name("db1", "t1"),
            suite_name("db1", "s1"),
            batch.clone(),
        );

        assert_eq!(config.class_name, "SimpleCheckpoint");
        assert_eq!(config.run_name_template, "%Y%m%d-%H%M%S");
        assert_eq!(config.validations.len(), 1);
        assert_eq!(config.validations[0].batch_request, batch);
        assert_eq!(batch.limit, 1000);
        assert_eq!(batch.batch_id(), "db1-c-t1");
    }
}
