//! Deterministic identifiers for suites and checkpoints.
//!
//! Both names are pure functions of the datasource name, the asset name and
//! the suite label; nothing else may alter them.

use serde::{Deserialize, Serialize};
use std::fmt;

const SUITE_SUFFIX: &str = "_expectation_suite";
const CHECKPOINT_SUFFIX: &str = "_checkpoint";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SuiteName(String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointName(String);

/// `{source_name}.{suite_label}_expectation_suite`
pub fn suite_name(source_name: &str, suite_label: &str) -> SuiteName {
    SuiteName(format!("{source_name}.{suite_label}{SUITE_SUFFIX}"))
}

/// `{source_name}.{asset_name}_checkpoint`
pub fn checkpoint_name(source_name: &str, asset_name: &str) -> CheckpointName {
    CheckpointName(format!("{source_name}.{asset_name}{CHECKPOINT_SUFFIX}"))
}

impl SuiteName {
    /// Wrap a name read back from storage.
    pub fn from_stored(raw: impl Into<String>) -> Self {
        SuiteName(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Relative path of the rendered suite page, without extension.
    pub fn docs_path(&self) -> String {
        self.0.replace('.', "/")
    }
}

impl CheckpointName {
    pub fn from_stored(raw: impl Into<String>) -> Self {
        CheckpointName(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SuiteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CheckpointName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SuiteName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for CheckpointName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
