//! Parallel scenario execution
//!
//! Scenarios run as separate tasks, bounded by a semaphore. Each scenario
//! generates its own resource names and state directories, so pinned names
//! are refused here.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use crate::config::env::{BUCKET_NAME, FUNCTION_NAME};
use crate::config::EnvResolver;
use crate::error::{HarnessError, HarnessResult};
use crate::models::{RunSummary, ScenarioReport};
use crate::orchestrator::Orchestrator;
use crate::scenario::Scenario;

/// Parallel scenario executor
pub struct ParallelExecutor {
    max_concurrent: usize,
}

impl ParallelExecutor {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub async fn run_all(
        &self,
        orchestrator: &Orchestrator,
        resolver: &EnvResolver,
        scenarios: &[Scenario],
    ) -> HarnessResult<RunSummary> {
        if resolver.has_name_overrides() {
            return Err(HarnessError::Config(format!(
                "{BUCKET_NAME} and {FUNCTION_NAME} cannot be pinned in parallel mode; \
                 concurrent scenarios would share resources"
            )));
        }

        info!(
            "Running {} scenario(s) in parallel (max {} concurrent)",
            scenarios.len(),
            self.max_concurrent
        );

        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::new();

        for &scenario in scenarios {
            let semaphore = semaphore.clone();
            let orchestrator = orchestrator.clone();
            let resolver = resolver.clone();

            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return ScenarioReport::rejected(
                            scenario,
                            &HarnessError::Fault(format!("scheduler closed: {e}")),
                        )
                    }
                };

                debug!("Starting parallel execution of {}", scenario);
                orchestrator.run_from_env(scenario, &resolver).await
            });

            handles.push((scenario, handle));
        }

        let (order, handles): (Vec<Scenario>, Vec<_>) = handles.into_iter().unzip();
        let reports: Vec<ScenarioReport> = join_all(handles)
            .await
            .into_iter()
            .zip(order)
            .map(|(joined, scenario)| {
                joined.unwrap_or_else(|e| {
                    error!("Scenario {} task failed: {}", scenario, e);
                    ScenarioReport::rejected(
                        scenario,
                        &HarnessError::Fault(format!("scenario task failed: {e}")),
                    )
                })
            })
            .collect();

        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let summary = RunSummary::new(reports, elapsed_ms);

        info!(
            "Parallel execution completed in {}ms - Pass: {}/{} ({:.1}%)",
            elapsed_ms,
            summary.passed,
            summary.total,
            summary.pass_rate()
        );

        Ok(summary)
    }
}

impl Default for ParallelExecutor {
    fn default() -> Self {
        Self::new(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::env::PROJECT_ID;
    use crate::executor::tests_support::{test_config, OkInfra};
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_rejects_pinned_names() {
        let state = tempfile::tempdir().unwrap();
        let infra = Arc::new(OkInfra::default());
        let orchestrator = Orchestrator::new(infra.clone(), test_config(&state)).unwrap();
        let resolver = EnvResolver::from_pairs([(PROJECT_ID, "p1"), (FUNCTION_NAME, "f1")]);

        let err = assert_err!(
            ParallelExecutor::new(2)
                .run_all(&orchestrator, &resolver, &Scenario::all())
                .await
        );
        assert!(matches!(err, HarnessError::Config(_)));
        assert_eq!(infra.applies(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_runs_scenarios_concurrently_in_order() {
        let state = tempfile::tempdir().unwrap();
        let infra = Arc::new(OkInfra::default());
        let orchestrator = Orchestrator::new(infra.clone(), test_config(&state)).unwrap();
        let resolver = EnvResolver::from_pairs([(PROJECT_ID, "p1")]);
        let scenarios = [Scenario::IamRoles, Scenario::Basic, Scenario::IamRoles];

        let summary = assert_ok!(
            ParallelExecutor::new(2)
                .run_all(&orchestrator, &resolver, &scenarios)
                .await
        );

        let ran: Vec<Scenario> = summary.reports.iter().map(|r| r.scenario).collect();
        assert_eq!(ran, scenarios);
        assert_eq!(infra.applies(), 6);
        assert_eq!(infra.destroys(), 6);

        let mut names: Vec<&str> = summary
            .reports
            .iter()
            .map(|r| r.function_name.as_str())
            .collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 3);
    }
}
