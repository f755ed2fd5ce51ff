//! Configuration module
//!
//! Harness settings: where the modules live, how Terraform is invoked and the
//! retry budgets for apply and probe. Loaded from YAML or JSON, then
//! overridden by CLI flags.

pub mod env;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::infra::{RetryClassifier, RetryablePattern};
use crate::utils::{Backoff, RetryPolicy};

pub use env::{EnvConfig, EnvResolver};

/// Harness configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Terraform binary name or path
    pub terraform_binary: PathBuf,

    /// Directory of the module under test
    pub module_dir: PathBuf,

    /// Directory of the prerequisite bucket module
    pub bucket_fixture_dir: PathBuf,

    /// Function source directory, as passed to the module
    pub file_location: String,

    /// Where the module writes the source archive
    pub zip_location: String,

    /// Root for per-scenario Terraform state and data directories
    pub state_dir: PathBuf,

    /// Function entry point
    pub entry_point: String,

    /// Also register a destroy when the module apply fails part-way
    pub destroy_after_failed_apply: bool,

    /// Maximum scenarios running at once in parallel mode
    pub max_concurrent: usize,

    pub apply: ApplyConfig,

    pub probe: ProbeConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            terraform_binary: PathBuf::from("terraform"),
            module_dir: PathBuf::from("."),
            bucket_fixture_dir: PathBuf::from("test/fixtures/bucket"),
            file_location: "./test/fixtures/src".to_string(),
            zip_location: "./test".to_string(),
            state_dir: PathBuf::from("test/.harness"),
            entry_point: "helloWorld".to_string(),
            destroy_after_failed_apply: false,
            max_concurrent: 2,
            apply: ApplyConfig::default(),
            probe: ProbeConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Self = if is_yaml(path) {
            serde_yaml::from_str(&content).context("Failed to parse YAML config")?
        } else {
            serde_json::from_str(&content).context("Failed to parse JSON config")?
        };

        Ok(config)
    }

    /// Load an explicit file, else the per-user file if present, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_yaml(path) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// `<config dir>/cloudfn-harness/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cloudfn-harness").join("config.yaml"))
    }

    /// Absolute state directory of one scenario run
    pub fn scenario_state_dir(&self, function_name: &str) -> Result<PathBuf> {
        let root = if self.state_dir.is_absolute() {
            self.state_dir.clone()
        } else {
            std::env::current_dir()
                .context("Failed to resolve working directory")?
                .join(&self.state_dir)
        };
        Ok(root.join(function_name))
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

/// Retry settings for module apply and destroy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyConfig {
    pub max_retries: u32,
    pub retry_interval_secs: u64,

    /// Extra error substrings treated as transient, on top of the built-in list
    pub retryable_patterns: Vec<String>,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_interval_secs: 5,
            retryable_patterns: Vec::new(),
        }
    }
}

impl ApplyConfig {
    /// The first attempt plus `max_retries` retries
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.max_retries.saturating_add(1),
            Duration::from_secs(self.retry_interval_secs),
        )
    }

    pub fn classifier(&self) -> RetryClassifier {
        self.retryable_patterns
            .iter()
            .fold(RetryClassifier::terraform_defaults(), |classifier, needle| {
                classifier.with_pattern(RetryablePattern::new(needle.as_str(), "Configured pattern"))
            })
    }
}

/// HTTP probe settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub max_retries: u32,
    pub interval_secs: u64,
    pub request_timeout_secs: u64,
    pub backoff: Backoff,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            interval_secs: 10,
            request_timeout_secs: 30,
            backoff: Backoff::Fixed,
        }
    }
}

impl ProbeConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_retries, Duration::from_secs(self.interval_secs))
            .with_backoff(self.backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HarnessConfig::default();
        assert_eq!(config.entry_point, "helloWorld");
        assert_eq!(config.probe.max_retries, 10);
        assert_eq!(config.probe.interval_secs, 10);
        assert!(!config.destroy_after_failed_apply);
        assert_eq!(
            config.probe.policy().worst_case_wait(),
            Duration::from_secs(90)
        );
    }

    #[test]
    fn test_yaml_round_trip_with_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.yaml");
        std::fs::write(
            &path,
            "module_dir: infra/function\nprobe:\n  max_retries: 3\n  backoff:\n    kind: exponential\n    multiplier: 2\n    max_interval_secs: 30\n",
        )
        .unwrap();

        let config = HarnessConfig::load(&path).unwrap();
        assert_eq!(config.module_dir, PathBuf::from("infra/function"));
        assert_eq!(config.probe.max_retries, 3);
        assert_eq!(config.probe.interval_secs, 10);
        assert_eq!(
            config.probe.backoff,
            Backoff::Exponential {
                multiplier: 2,
                max_interval_secs: 30
            }
        );
        assert_eq!(config.apply, ApplyConfig::default());
    }

    #[test]
    fn test_apply_retries_come_on_top_of_first_attempt() {
        let apply = ApplyConfig {
            max_retries: 3,
            retry_interval_secs: 0,
            ..Default::default()
        };
        let policy = apply.policy();
        assert_eq!(policy.max_attempts, 4);
        assert!(policy.allows_another(3));
        assert!(!policy.allows_another(4));

        let no_retries = ApplyConfig {
            max_retries: 0,
            ..Default::default()
        };
        assert_eq!(no_retries.policy().max_attempts, 1);
    }

    #[test]
    fn test_configured_retryable_patterns() {
        let apply = ApplyConfig {
            retryable_patterns: vec!["Error 409: concurrent policy changes".into()],
            ..Default::default()
        };
        let err = crate::infra::InfraError::CommandFailed {
            command: "terraform apply".into(),
            exit_code: Some(1),
            output: "googleapi: Error 409: Concurrent policy changes".into(),
        };
        assert!(apply.classifier().classify(&err).is_some());
        assert!(ApplyConfig::default().classifier().classify(&err).is_none());
    }

    #[test]
    fn test_save_and_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("harness.json");

        let mut config = HarnessConfig::default();
        config.max_concurrent = 5;
        config.save(&path).unwrap();

        let loaded = HarnessConfig::load_or_default(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(HarnessConfig::load_or_default(Some(&dir.path().join("nope.yaml"))).is_err());
    }

    #[test]
    fn test_scenario_state_dir_is_absolute() {
        let config = HarnessConfig::default();
        let dir = config.scenario_state_dir("fn-1").unwrap();
        assert!(dir.is_absolute());
        assert!(dir.ends_with("test/.harness/fn-1"));
    }
}
