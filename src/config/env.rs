//! Environment variable resolution
//!
//! Scenario parameters come from the process environment. Mandatory values
//! fail fast; optional resource names default to a unique name so repeated
//! or concurrent runs never collide.

use rand::Rng;
use std::collections::HashMap;
use std::env;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{HarnessError, HarnessResult};

pub const PROJECT_ID: &str = "PROJECT_ID";
pub const REGION: &str = "REGION";
pub const BUCKET_NAME: &str = "BUCKET_NAME";
pub const FUNCTION_NAME: &str = "FUNCTION_NAME";

/// Names used by earlier versions of the harness, still honoured
const PROJECT_ID_FALLBACK: &str = "GCP_PROJECT_ID";
const REGION_FALLBACK: &str = "GCP_REGION";

pub const DEFAULT_REGION: &str = "us-central1";

/// Reads named parameters from a snapshot of the environment
#[derive(Clone, Debug, Default)]
pub struct EnvResolver {
    vars: HashMap<String, String>,
}

impl EnvResolver {
    /// Snapshot of the process environment; non-UTF-8 entries are ignored
    pub fn process() -> Self {
        Self::from_pairs(
            env::vars_os().filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?))),
        )
    }

    /// Resolver over an explicit set of variables
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Non-empty value of `name`, if set
    pub fn lookup(&self, name: &str) -> Option<String> {
        self.vars
            .get(name)
            .filter(|v| !v.trim().is_empty())
            .cloned()
    }

    /// First non-empty value among `names`
    pub fn lookup_any(&self, names: &[&str]) -> Option<String> {
        names.iter().find_map(|name| self.lookup(name))
    }

    /// Value of `name`, or `default` when unset or empty
    pub fn resolve(&self, name: &str, default: &str) -> String {
        self.lookup(name).unwrap_or_else(|| default.to_string())
    }

    /// Value of `name`; a configuration error when unset or empty
    pub fn require(&self, name: &str) -> HarnessResult<String> {
        self.lookup(name).ok_or_else(|| {
            HarnessError::Config(format!("environment variable {name} is required"))
        })
    }

    /// Mandatory project id
    pub fn project_id(&self) -> HarnessResult<String> {
        self.require(PROJECT_ID)
            .or_else(|err| self.lookup(PROJECT_ID_FALLBACK).ok_or(err))
    }

    pub fn region(&self) -> String {
        self.resolve(REGION, &self.resolve(REGION_FALLBACK, DEFAULT_REGION))
    }

    /// Pinned bucket name, or a freshly generated unique one
    pub fn bucket_name(&self) -> String {
        self.lookup(BUCKET_NAME).unwrap_or_else(default_bucket_name)
    }

    /// Pinned function name, or a freshly generated unique one
    pub fn function_name(&self) -> String {
        self.lookup(FUNCTION_NAME)
            .unwrap_or_else(default_function_name)
    }

    /// Whether resource names are pinned instead of generated
    pub fn has_name_overrides(&self) -> bool {
        self.lookup(BUCKET_NAME).is_some() || self.lookup(FUNCTION_NAME).is_some()
    }
}

/// Scenario parameters as found in the environment
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvConfig {
    pub project_id: Option<String>,
    pub region: Option<String>,
    pub bucket_name: Option<String>,
    pub function_name: Option<String>,
}

impl EnvConfig {
    pub fn load(resolver: &EnvResolver) -> Self {
        Self {
            project_id: resolver.lookup_any(&[PROJECT_ID, PROJECT_ID_FALLBACK]),
            region: resolver.lookup_any(&[REGION, REGION_FALLBACK]),
            bucket_name: resolver.lookup(BUCKET_NAME),
            function_name: resolver.lookup(FUNCTION_NAME),
        }
    }

    /// Print current environment configuration
    pub fn print_summary(&self) {
        println!("Environment Configuration:");
        println!("  {PROJECT_ID}:     {:?}", self.project_id);
        println!("  {REGION}:         {:?}", self.region);
        println!("  {BUCKET_NAME}:    {:?}", self.bucket_name);
        println!("  {FUNCTION_NAME}:  {:?}", self.function_name);
    }
}

/// `<epoch seconds>-<8 hex digits>`
pub fn unique_suffix() -> String {
    let epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let salt: u32 = rand::rng().random();
    format!("{epoch}-{salt:08x}")
}

pub fn default_bucket_name() -> String {
    format!("harness-bucket-{}", unique_suffix())
}

/// Kept short: `<name>-sa` must fit the 30 character service account id limit
pub fn default_function_name() -> String {
    format!("fn-{}", unique_suffix())
}

/// Print the environment variables the harness reads
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {PROJECT_ID}      Cloud project id (required; {PROJECT_ID_FALLBACK} also accepted)");
    println!("  {REGION}          Deployment region (default: {DEFAULT_REGION}; {REGION_FALLBACK} also accepted)");
    println!("  {BUCKET_NAME}     Prerequisite bucket name (default: harness-bucket-<epoch>-<hex>)");
    println!("  {FUNCTION_NAME}   Function name (default: fn-<epoch>-<hex>)");
    println!("  RUST_LOG         Log filter (overrides --log-level)");
    println!();
    println!("Example:");
    println!("  export {PROJECT_ID}=my-project");
    println!("  cloudfn-harness run --scenario all");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    /// Sets process variables and restores them on drop
    struct EnvGuard {
        previous: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn set(vars: &[(&str, Option<&str>)]) -> Self {
            let previous = vars
                .iter()
                .map(|(k, _)| (k.to_string(), env::var(k).ok()))
                .collect();
            for (key, value) in vars {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
            Self { previous }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in &self.previous {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_resolve_uses_default_when_unset_or_empty() {
        let resolver = EnvResolver::from_pairs([(REGION, ""), (BUCKET_NAME, "b1")]);
        assert_eq!(resolver.resolve(REGION, DEFAULT_REGION), DEFAULT_REGION);
        assert_eq!(resolver.resolve(BUCKET_NAME, "other"), "b1");
        assert_eq!(resolver.resolve(FUNCTION_NAME, "fallback"), "fallback");
    }

    #[test]
    fn test_require_fails_on_missing() {
        let resolver = EnvResolver::from_pairs([(PROJECT_ID, "  ")]);
        let err = resolver.require(PROJECT_ID).unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
        assert!(err.to_string().contains(PROJECT_ID));
    }

    #[test]
    fn test_fallback_names() {
        let resolver =
            EnvResolver::from_pairs([(PROJECT_ID_FALLBACK, "legacy"), (REGION_FALLBACK, "eu")]);
        assert_eq!(resolver.project_id().unwrap(), "legacy");
        assert_eq!(resolver.region(), "eu");

        let both = EnvResolver::from_pairs([(PROJECT_ID, "new"), (PROJECT_ID_FALLBACK, "legacy")]);
        assert_eq!(both.project_id().unwrap(), "new");
        assert_eq!(EnvConfig::load(&both).project_id.as_deref(), Some("new"));
    }

    #[test]
    fn test_missing_project_id_is_config_error() {
        let resolver = EnvResolver::from_pairs([(REGION, "eu")]);
        let err = resolver.project_id().unwrap_err();
        assert!(err.to_string().contains(PROJECT_ID));
    }

    #[test]
    fn test_generated_names_are_unique() {
        let resolver = EnvResolver::from_pairs(Vec::<(String, String)>::new());
        assert!(!resolver.has_name_overrides());

        let a = resolver.function_name();
        let b = resolver.function_name();
        assert_ne!(a, b);
        assert!(a.starts_with("fn-"));
        assert!(format!("{a}-sa").len() <= 30);
        assert!(resolver.bucket_name().starts_with("harness-bucket-"));
        assert_ne!(resolver.bucket_name(), resolver.bucket_name());
    }

    #[test]
    fn test_name_overrides() {
        let resolver = EnvResolver::from_pairs([(FUNCTION_NAME, "f1")]);
        assert!(resolver.has_name_overrides());
        assert_eq!(resolver.function_name(), "f1");
        assert_eq!(resolver.region(), DEFAULT_REGION);
    }

    #[test]
    #[serial]
    fn test_process_environment() {
        let _guard = EnvGuard::set(&[
            (PROJECT_ID, Some("p-env")),
            (PROJECT_ID_FALLBACK, None),
            (REGION, None),
            (REGION_FALLBACK, None),
        ]);

        let resolver = EnvResolver::process();
        assert_eq!(resolver.project_id().unwrap(), "p-env");
        assert_eq!(resolver.region(), DEFAULT_REGION);
        assert_eq!(EnvConfig::load(&resolver).project_id.as_deref(), Some("p-env"));
    }

    #[test]
    #[serial]
    fn test_process_environment_missing_project() {
        let _guard = EnvGuard::set(&[(PROJECT_ID, None), (PROJECT_ID_FALLBACK, None)]);

        let resolver = EnvResolver::process();
        assert!(matches!(resolver.project_id(), Err(HarnessError::Config(_))));
    }
}
