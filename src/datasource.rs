//! Datasource configuration loading.
//!
//! The datasource document is YAML in the shape the data context registers
//! verbatim. Only a handful of identifying fields are extracted here; the rest
//! of the document is carried through untouched.

use crate::error::{SessionError, SessionResult};
use serde_yaml::{Mapping, Value};

/// Connector used when the document defines one under this name.
pub const DEFAULT_CONNECTOR_NAME: &str = "default_configured_data_connector_name";

#[derive(Debug, Clone, PartialEq)]
pub struct DatasourceConfig {
    source_name: String,
    asset_name: String,
    connector_name: String,
    registration_name: String,
    raw: Value,
}

impl DatasourceConfig {
    pub fn from_yaml(text: &str) -> SessionResult<Self> {
        let raw: Value = serde_yaml::from_str(text)
            .map_err(|err| SessionError::datasource(format!("unparseable YAML: {err}")))?;
        Self::from_value(raw)
    }

    pub fn from_value(raw: Value) -> SessionResult<Self> {
        if !raw.is_mapping() {
            return Err(SessionError::datasource("document root must be a mapping"));
        }

        let source_name = lookup(&raw, &["execution_engine", "credentials", "database"])
            .ok_or_else(|| {
                SessionError::datasource("missing `execution_engine.credentials.database`")
            })
            .and_then(|value| {
                scalar_text(value).ok_or_else(|| {
                    SessionError::datasource(
                        "`execution_engine.credentials.database` must be a string or number",
                    )
                })
            })?;

        let connectors = lookup(&raw, &["data_connectors"])
            .and_then(Value::as_mapping)
            .ok_or_else(|| SessionError::datasource("missing `data_connectors` mapping"))?;
        let (connector_name, connector) = select_connector(connectors)
            .ok_or_else(|| SessionError::datasource("`data_connectors` is empty"))?;

        let asset_name = connector
            .get("assets")
            .and_then(Value::as_mapping)
            .and_then(|assets| assets.keys().next())
            .and_then(Value::as_str)
            .ok_or_else(|| {
                SessionError::datasource(format!(
                    "missing first asset under `data_connectors.{connector_name}.assets`"
                ))
            })?
            .to_string();

        let registration_name = raw
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(&source_name)
            .to_string();

        Ok(Self {
            source_name,
            asset_name,
            connector_name,
            registration_name,
            raw,
        })
    }

    /// Database named in the execution engine credentials.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn asset_name(&self) -> &str {
        &self.asset_name
    }

    pub fn connector_name(&self) -> &str {
        &self.connector_name
    }

    /// Name the datasource is registered under in the data context.
    pub fn registration_name(&self) -> &str {
        &self.registration_name
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

fn select_connector(connectors: &Mapping) -> Option<(String, &Value)> {
    if let Some(connector) = connectors.get(DEFAULT_CONNECTOR_NAME) {
        return Some((DEFAULT_CONNECTOR_NAME.to_string(), connector));
    }
    connectors
        .iter()
        .find_map(|(key, value)| key.as_str().map(|name| (name.to_string(), value)))
}

/// Database names such as `2024` arrive as YAML numbers.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}
