//! Scenario catalogue
//!
//! A scenario fixes the function's description and IAM roles and the
//! expectations its outputs must meet. [`TestContext`] binds a scenario to
//! concrete names for one run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::{EnvResolver, HarnessConfig};
use crate::error::{HarnessError, HarnessResult};
use crate::infra::ModuleOptions;
use crate::validate::{service_account_email, Expectation};

pub const OUTPUT_FUNCTION_ID: &str = "function_id";
pub const OUTPUT_FUNCTION_STATE: &str = "function_state";
pub const OUTPUT_FUNCTION_URL: &str = "function_url";
pub const OUTPUT_SERVICE_ACCOUNT_EMAIL: &str = "service_account_email";

/// Built-in scenarios
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// Deploy, check every output, then call the function
    Basic,
    /// Deploy with extra IAM roles on the service account
    IamRoles,
}

impl Scenario {
    pub fn all() -> Vec<Scenario> {
        vec![Scenario::Basic, Scenario::IamRoles]
    }

    pub fn slug(&self) -> &'static str {
        match self {
            Scenario::Basic => "basic",
            Scenario::IamRoles => "iam-roles",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Basic => "Basic function",
            Scenario::IamRoles => "Function with IAM roles",
        }
    }

    /// Passed to the module as `function_description`
    pub fn description(&self) -> &'static str {
        match self {
            Scenario::Basic => "Test function for Terratest",
            Scenario::IamRoles => "Test function with IAM roles",
        }
    }

    pub fn iam_roles(&self) -> Vec<String> {
        match self {
            Scenario::Basic => Vec::new(),
            Scenario::IamRoles => vec![
                "roles/storage.objectViewer".to_string(),
                "roles/pubsub.subscriber".to_string(),
            ],
        }
    }

    /// Output holding the URL to probe, if the scenario calls the function
    pub fn probe_output(&self) -> Option<&'static str> {
        match self {
            Scenario::Basic => Some(OUTPUT_FUNCTION_URL),
            Scenario::IamRoles => None,
        }
    }

    pub fn expectations(&self, ctx: &TestContext) -> Vec<Expectation> {
        match self {
            Scenario::Basic => vec![
                Expectation::non_empty(OUTPUT_FUNCTION_ID),
                Expectation::equals(OUTPUT_FUNCTION_STATE, "ACTIVE"),
                Expectation::non_empty(OUTPUT_FUNCTION_URL),
                Expectation::contains(OUTPUT_FUNCTION_ID, ctx.function_name.as_str()),
                Expectation::equals(
                    OUTPUT_SERVICE_ACCOUNT_EMAIL,
                    service_account_email(&ctx.function_name, &ctx.project_id),
                ),
            ],
            Scenario::IamRoles => vec![
                Expectation::non_empty(OUTPUT_FUNCTION_ID),
                Expectation::non_empty(OUTPUT_SERVICE_ACCOUNT_EMAIL),
            ],
        }
    }

    pub fn print_all(detailed: bool) {
        println!("Available Scenarios:");
        println!();
        for scenario in Scenario::all() {
            println!("  {:<10} {}", scenario.slug(), scenario.name());
            if detailed {
                println!("             description: {}", scenario.description());
                let roles = scenario.iam_roles();
                if !roles.is_empty() {
                    println!("             iam roles:   {}", roles.join(", "));
                }
                match scenario.probe_output() {
                    Some(output) => println!("             probes:      {output}"),
                    None => println!("             probes:      (none)"),
                }
            }
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slug())
    }
}

impl FromStr for Scenario {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "basic" => Ok(Scenario::Basic),
            "iam-roles" | "iam" => Ok(Scenario::IamRoles),
            other => Err(HarnessError::Config(format!("unknown scenario: {other}"))),
        }
    }
}

/// Everything one scenario run needs, fixed before the first resource exists
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestContext {
    pub scenario: Scenario,
    pub project_id: String,
    pub region: String,
    pub bucket_name: String,
    pub function_name: String,
    pub entry_point: String,
    pub description: String,
    pub iam_roles: Vec<String>,
    pub module_dir: PathBuf,
    pub file_location: String,
    pub zip_location: String,
    /// Root of this run's state; `module/` and `bucket/` live below it
    pub state_dir: PathBuf,
}

impl TestContext {
    /// Resolve names from the environment; fails before any side effect
    pub fn build(
        scenario: Scenario,
        resolver: &EnvResolver,
        config: &HarnessConfig,
    ) -> HarnessResult<Self> {
        let project_id = resolver.project_id()?;
        let function_name = resolver.function_name();
        let state_dir = config
            .scenario_state_dir(&function_name)
            .map_err(|e| HarnessError::Config(format!("{e:#}")))?;

        Ok(Self {
            scenario,
            project_id,
            region: resolver.region(),
            bucket_name: resolver.bucket_name(),
            function_name,
            entry_point: config.entry_point.clone(),
            description: scenario.description().to_string(),
            iam_roles: scenario.iam_roles(),
            module_dir: config.module_dir.clone(),
            file_location: config.file_location.clone(),
            zip_location: config.zip_location.clone(),
            state_dir,
        })
    }

    pub fn module_state_dir(&self) -> PathBuf {
        self.state_dir.join("module")
    }

    pub fn bucket_state_dir(&self) -> PathBuf {
        self.state_dir.join("bucket")
    }

    /// Inputs for the module under test
    pub fn module_options(&self) -> ModuleOptions {
        ModuleOptions::new(format!("function {}", self.function_name), &self.module_dir)
            .var("project_id", self.project_id.as_str())
            .var("region", self.region.as_str())
            .var("file_location", self.file_location.as_str())
            .var("zip_location", self.zip_location.as_str())
            .var("bucket_name", self.bucket_name.as_str())
            .var("function_name", self.function_name.as_str())
            .var("function_description", self.description.as_str())
            .var("function_entry_point", self.entry_point.as_str())
            .var("function_iam_roles", self.iam_roles.clone())
            .with_state_dir(self.module_state_dir())
    }

    pub fn expectations(&self) -> Vec<Expectation> {
        self.scenario.expectations(self)
    }
}
