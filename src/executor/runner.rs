//! Sequential scenario runner

use std::time::Instant;
use tracing::info;

use crate::config::EnvResolver;
use crate::models::{RunSummary, ScenarioReport};
use crate::orchestrator::Orchestrator;
use crate::scenario::Scenario;

/// Runs scenarios one after another
pub struct ScenarioRunner {
    orchestrator: Orchestrator,
    resolver: EnvResolver,
}

impl ScenarioRunner {
    pub fn new(orchestrator: Orchestrator, resolver: EnvResolver) -> Self {
        Self {
            orchestrator,
            resolver,
        }
    }

    pub async fn run_scenario(&self, scenario: Scenario) -> ScenarioReport {
        info!("Running scenario {}", scenario);
        self.orchestrator
            .run_from_env(scenario, &self.resolver)
            .await
    }

    pub async fn run_all(&self, scenarios: &[Scenario]) -> RunSummary {
        info!("Running {} scenario(s) sequentially", scenarios.len());

        let start = Instant::now();
        let mut reports = Vec::new();

        for &scenario in scenarios {
            let report = self.run_scenario(scenario).await;
            info!("  {}", report);
            reports.push(report);
        }

        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let summary = RunSummary::new(reports, elapsed_ms);

        info!(
            "Run completed in {}ms - Pass: {}/{} ({:.1}%)",
            elapsed_ms,
            summary.passed,
            summary.total,
            summary.pass_rate()
        );

        summary
    }
}
