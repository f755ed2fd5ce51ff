//! Module outputs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::InfraError;

/// Output name to value, as produced by one apply
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyResult {
    outputs: BTreeMap<String, String>,
}

impl ApplyResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.outputs.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.outputs.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }

    /// Parse `terraform output -json`
    ///
    /// Each entry looks like `{"sensitive": false, "type": "string", "value": ...}`.
    /// Strings are kept verbatim; any other value is stored as compact JSON.
    pub fn from_terraform_json(raw: &str) -> Result<Self, InfraError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::new());
        }

        let parsed: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(trimmed).map_err(|e| InfraError::OutputParse(e.to_string()))?;

        let mut result = Self::new();
        for (name, entry) in parsed {
            let value = entry.get("value").ok_or_else(|| {
                InfraError::OutputParse(format!("output `{name}` has no value field"))
            })?;
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            result = result.with_output(name, rendered);
        }

        Ok(result)
    }
}

impl FromIterator<(String, String)> for ApplyResult {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            outputs: iter.into_iter().collect(),
        }
    }
}
