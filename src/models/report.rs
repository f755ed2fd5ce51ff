use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::check::{CheckResult, TestStatus};
use crate::cleanup::CleanupFailure;
use crate::error::HarnessError;
use crate::probe::ProbeResult;
use crate::scenario::{Scenario, TestContext};

/// Lifecycle state of a scenario run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioState {
    Init,
    ResourceProvisioned,
    ModuleApplied,
    Validated,
    Failed,
    Cleaned,
}

impl fmt::Display for ScenarioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScenarioState::Init => "init",
            ScenarioState::ResourceProvisioned => "resource_provisioned",
            ScenarioState::ModuleApplied => "module_applied",
            ScenarioState::Validated => "validated",
            ScenarioState::Failed => "failed",
            ScenarioState::Cleaned => "cleaned",
        };
        write!(f, "{name}")
    }
}

/// A harness error as it appears in a report
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedError {
    pub class: String,
    pub message: String,
}

impl From<&HarnessError> for ReportedError {
    fn from(error: &HarnessError) -> Self {
        Self {
            class: error.label().to_string(),
            message: error.to_string(),
        }
    }
}

/// Duration of one lifecycle step
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTiming {
    pub step: String,
    pub duration_ms: u64,
}

/// Result of one scenario run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    pub function_name: String,
    pub bucket_name: String,
    pub project_id: String,
    pub region: String,
    pub status: TestStatus,
    pub states: Vec<ScenarioState>,
    pub checks: Vec<CheckResult>,
    pub probe: Option<ProbeResult>,
    /// Why the probe did not run, when the scenario probes
    pub probe_skipped: Option<String>,
    pub error: Option<ReportedError>,
    pub cleanup_failures: Vec<CleanupFailure>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub steps: Vec<StepTiming>,
}

impl ScenarioReport {
    /// Fresh report in the `Init` state
    pub fn started(ctx: &TestContext) -> Self {
        Self {
            scenario: ctx.scenario,
            function_name: ctx.function_name.clone(),
            bucket_name: ctx.bucket_name.clone(),
            project_id: ctx.project_id.clone(),
            region: ctx.region.clone(),
            status: TestStatus::Pass,
            states: vec![ScenarioState::Init],
            checks: Vec::new(),
            probe: None,
            probe_skipped: None,
            error: None,
            cleanup_failures: Vec::new(),
            started_at: Utc::now(),
            duration_ms: 0,
            steps: Vec::new(),
        }
    }

    /// Report for a scenario that never started, e.g. for missing configuration
    pub fn rejected(scenario: Scenario, error: &HarnessError) -> Self {
        Self {
            scenario,
            function_name: String::new(),
            bucket_name: String::new(),
            project_id: String::new(),
            region: String::new(),
            status: TestStatus::Error,
            states: vec![
                ScenarioState::Init,
                ScenarioState::Failed,
                ScenarioState::Cleaned,
            ],
            checks: Vec::new(),
            probe: None,
            probe_skipped: None,
            error: Some(error.into()),
            cleanup_failures: Vec::new(),
            started_at: Utc::now(),
            duration_ms: 0,
            steps: Vec::new(),
        }
    }

    pub fn final_state(&self) -> Option<ScenarioState> {
        self.states.last().copied()
    }

    pub fn passed(&self) -> bool {
        self.status.is_success()
    }

    pub fn failed_checks(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| c.status == TestStatus::Fail)
            .count()
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}) [{}ms]",
            self.status.symbol(),
            self.scenario.name(),
            self.function_name,
            self.duration_ms
        )?;
        if let Some(err) = &self.error {
            write!(f, " - {}", err.message)?;
        }
        Ok(())
    }
}

/// Summary of a harness run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub total_duration_ms: u64,
    pub reports: Vec<ScenarioReport>,
}

impl RunSummary {
    pub fn new(reports: Vec<ScenarioReport>, total_duration_ms: u64) -> Self {
        let count = |status: TestStatus| reports.iter().filter(|r| r.status == status).count();

        Self {
            total: reports.len(),
            passed: reports.iter().filter(|r| r.passed()).count(),
            failed: count(TestStatus::Fail),
            errors: count(TestStatus::Error),
            total_duration_ms,
            reports,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.total > 0 && self.passed == self.total
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.passed as f64 / self.total as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::env::{FUNCTION_NAME, PROJECT_ID};
    use crate::config::{EnvResolver, HarnessConfig};

    fn report(status: TestStatus) -> ScenarioReport {
        let resolver = EnvResolver::from_pairs([(PROJECT_ID, "p1"), (FUNCTION_NAME, "f1")]);
        let ctx = TestContext::build(Scenario::Basic, &resolver, &HarnessConfig::default())
            .unwrap();
        let mut report = ScenarioReport::started(&ctx);
        report.status = status;
        report
    }

    #[test]
    fn test_started_report() {
        let report = report(TestStatus::Pass);
        assert_eq!(report.final_state(), Some(ScenarioState::Init));
        assert_eq!(report.function_name, "f1");
        assert_eq!(report.failed_checks(), 0);
    }

    #[test]
    fn test_run_summary() {
        let summary = RunSummary::new(
            vec![
                report(TestStatus::Pass),
                report(TestStatus::Fail),
                report(TestStatus::Error),
            ],
            1000,
        );
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.errors, 1);
        assert!(!summary.all_passed());
        assert!((summary.pass_rate() - 33.33).abs() < 0.1);

        assert!(!RunSummary::new(Vec::new(), 0).all_passed());
    }

    #[test]
    fn test_reported_error_keeps_class() {
        let err = HarnessError::Probe("never answered".into());
        let reported = ReportedError::from(&err);
        assert_eq!(reported.class, "probe");
        assert!(reported.message.contains("never answered"));
    }
}
