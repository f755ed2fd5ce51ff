//! Module invocation options

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Value of a module input variable
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    String(String),
    List(Vec<String>),
}

impl VarValue {
    /// Render for `-var name=<value>`; lists use JSON, which HCL accepts
    pub fn to_cli_value(&self) -> String {
        match self {
            VarValue::String(s) => s.clone(),
            VarValue::List(items) => {
                serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
            }
        }
    }
}

impl From<&str> for VarValue {
    fn from(value: &str) -> Self {
        VarValue::String(value.to_string())
    }
}

impl From<String> for VarValue {
    fn from(value: String) -> Self {
        VarValue::String(value)
    }
}

impl From<Vec<String>> for VarValue {
    fn from(value: Vec<String>) -> Self {
        VarValue::List(value)
    }
}

/// Everything the engine needs to apply or destroy one module instance
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ModuleOptions {
    /// Human readable name used in logs and errors
    pub name: String,

    /// Module directory
    pub dir: PathBuf,

    /// Input variables
    pub vars: BTreeMap<String, VarValue>,

    /// Backend configuration passed at init time
    pub backend_config: BTreeMap<String, String>,

    /// Extra environment for the engine process
    pub env: BTreeMap<String, String>,
}

impl ModuleOptions {
    pub fn new(name: impl Into<String>, dir: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            dir: dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn var(mut self, key: impl Into<String>, value: impl Into<VarValue>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn backend(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.backend_config.insert(key.into(), value.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Keep state and the engine's data directory under `dir`
    pub fn with_state_dir(self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let state = dir.join("terraform.tfstate").display().to_string();
        let data = dir.join(".terraform").display().to_string();
        self.backend("path", state).env("TF_DATA_DIR", data)
    }

    /// Look up a string variable
    #[cfg(test)]
    pub fn string_var(&self, key: &str) -> Option<&str> {
        match self.vars.get(key) {
            Some(VarValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_var_renders_as_json() {
        let roles = VarValue::from(vec![
            "roles/storage.objectViewer".to_string(),
            "roles/pubsub.subscriber".to_string(),
        ]);
        assert_eq!(
            roles.to_cli_value(),
            r#"["roles/storage.objectViewer","roles/pubsub.subscriber"]"#
        );
        assert_eq!(VarValue::List(Vec::new()).to_cli_value(), "[]");
    }

    #[test]
    fn test_options_builder() {
        let options = ModuleOptions::new("bucket", "test/fixtures/bucket")
            .var("project_id", "p1")
            .var("bucket_name", "b1")
            .backend("path", "/tmp/state/terraform.tfstate")
            .env("TF_DATA_DIR", "/tmp/data");

        assert_eq!(options.string_var("project_id"), Some("p1"));
        assert_eq!(options.string_var("missing"), None);
        assert_eq!(options.backend_config.len(), 1);
        assert_eq!(options.env.get("TF_DATA_DIR").map(String::as_str), Some("/tmp/data"));
    }

    #[test]
    fn test_state_dir_sets_backend_and_data_dir() {
        let options = ModuleOptions::new("module", ".").with_state_dir("/tmp/h/fn-1/module");
        assert_eq!(
            options.backend_config.get("path").map(String::as_str),
            Some("/tmp/h/fn-1/module/terraform.tfstate")
        );
        assert_eq!(
            options.env.get("TF_DATA_DIR").map(String::as_str),
            Some("/tmp/h/fn-1/module/.terraform")
        );
    }
}
