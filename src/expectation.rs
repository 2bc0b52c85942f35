//! Declarative expectations and the suites that hold them.

use crate::error::{SessionError, SessionResult};
use crate::naming::SuiteName;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const CREATED_BY: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// A single declarative rule as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDescriptor {
    pub expectation_type: String,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl RuleDescriptor {
    pub fn new(expectation_type: impl Into<String>) -> Self {
        Self {
            expectation_type: expectation_type.into(),
            kwargs: Map::new(),
            meta: Map::new(),
        }
    }

    pub fn with_kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

/// Suite configuration supplied with a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteConfig {
    /// Label combined with the datasource name to form the suite name
    #[serde(rename = "expectation_suite_name")]
    pub suite_label: String,
    #[serde(rename = "expectations", default)]
    pub rules: Vec<RuleDescriptor>,
}

impl SuiteConfig {
    pub fn new(suite_label: impl Into<String>, rules: Vec<RuleDescriptor>) -> Self {
        Self {
            suite_label: suite_label.into(),
            rules,
        }
    }

    pub fn from_value(value: Value) -> SessionResult<Self> {
        let config: SuiteConfig =
            serde_json::from_value(value).map_err(|err| SessionError::suite(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(text: &str) -> SessionResult<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|err| SessionError::suite(err.to_string()))?;
        Self::from_value(value)
    }

    fn validate(&self) -> SessionResult<()> {
        if self.suite_label.trim().is_empty() {
            return Err(SessionError::suite("`expectation_suite_name` cannot be empty"));
        }
        if let Some(position) = self
            .rules
            .iter()
            .position(|rule| rule.expectation_type.trim().is_empty())
        {
            return Err(SessionError::suite(format!(
                "expectation #{position} has an empty `expectation_type`"
            )));
        }
        Ok(())
    }
}

/// Named, ordered collection of accepted rules as persisted by the data context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectationSuite {
    pub expectation_suite_name: SuiteName,
    #[serde(default)]
    pub expectations: Vec<RuleDescriptor>,
    #[serde(default)]
    pub meta: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_asset_type: Option<String>,
}

impl ExpectationSuite {
    pub fn new(name: SuiteName) -> Self {
        let mut meta = Map::new();
        meta.insert(
            "created_by".to_string(),
            Value::String(CREATED_BY.to_string()),
        );
        Self {
            expectation_suite_name: name,
            expectations: Vec::new(),
            meta,
            data_asset_type: None,
        }
    }

    pub fn name(&self) -> &SuiteName {
        &self.expectation_suite_name
    }

    pub fn add_expectation(&mut self, rule: RuleDescriptor) {
        self.expectations.push(rule);
    }

    pub fn len(&self) -> usize {
        self.expectations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expectations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::suite_name;
    use serde_json::json;

    #[test]
    fn parses_suite_config_with_optional_meta() {
        let config = SuiteConfig::from_value(json!({
            "expectation_suite_name": "s1",
            "expectations": [
                {"expectation_type": "expect_column_to_exist", "kwargs": {"column": "id"}},
                {
                    "expectation_type": "expect_column_values_to_not_be_null",
                    "kwargs": {"column": "id"},
                    "meta": {"notes": "primary key"}
                }
            ]
        }))
        .unwrap();

        assert_eq!(config.suite_label, "s1");
        assert_eq!(config.rules.len(), 2);
        assert!(config.rules[0].meta.is_empty());
        assert_eq!(config.rules[1].meta["notes"], "primary key");
    }

    #[test]
    fn missing_label_is_config_error() {
        let err = SuiteConfig::from_value(json!({"expectations": []})).unwrap_err();
        assert!(err.is_config());

        let err = SuiteConfig::from_value(json!({"expectation_suite_name": " "})).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn suite_keeps_insertion_order() {
        let mut suite = ExpectationSuite::new(suite_name("db1", "s1"));
        suite.add_expectation(RuleDescriptor::new("b"));
        suite.add_expectation(RuleDescriptor::new("a"));
        let types: Vec<_> = suite
            .expectations
            .iter()
            .map(|rule| rule.expectation_type.as_str())
            .collect();
        assert_eq!(types, vec!["b", "a"]);
    }
}
