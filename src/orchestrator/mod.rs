//! Scenario lifecycle
//!
//! Drives one scenario through provision, apply, validate and probe, then
//! unwinds the cleanup stack no matter how the steps ended:
//!
//! ```text
//! Init -> ResourceProvisioned -> ModuleApplied -> Validated -> Cleaned
//!   \____________________\___________________\______> Failed -> Cleaned
//! ```

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::cleanup::{panic_message, CleanupFailure, CleanupStack};
use crate::config::{EnvResolver, HarnessConfig};
use crate::error::{HarnessError, HarnessResult};
use crate::infra::{Infrastructure, ModuleInvoker, TerraformCli};
use crate::models::{ScenarioReport, ScenarioState, StepTiming, TestStatus};
use crate::probe::HttpProbe;
use crate::provision::{BucketProvisioner, ProvisionedResource, ResourceKind};
use crate::scenario::{Scenario, TestContext};
use crate::utils::Timer;
use crate::validate::{summarize_failures, OutputValidator};

/// Runs scenarios against an infrastructure engine
#[derive(Clone)]
pub struct Orchestrator {
    infra: Arc<dyn Infrastructure>,
    config: HarnessConfig,
    invoker: ModuleInvoker,
    probe: HttpProbe,
}

impl Orchestrator {
    pub fn new(infra: Arc<dyn Infrastructure>, config: HarnessConfig) -> HarnessResult<Self> {
        let probe = HttpProbe::new(config.probe.request_timeout_secs)
            .map_err(|e| HarnessError::Config(e.to_string()))?;
        let invoker = ModuleInvoker::new(infra.clone(), config.apply.policy())
            .with_classifier(config.apply.classifier());

        Ok(Self {
            infra,
            config,
            invoker,
            probe,
        })
    }

    /// Orchestrator backed by the `terraform` CLI
    pub fn terraform(config: HarnessConfig) -> HarnessResult<Self> {
        let infra = Arc::new(TerraformCli::new(config.terraform_binary.clone()));
        Self::new(infra, config)
    }

    /// Resolve the scenario's context from the environment, then run it.
    /// Configuration errors are reported without touching any resource.
    pub async fn run_from_env(&self, scenario: Scenario, resolver: &EnvResolver) -> ScenarioReport {
        match TestContext::build(scenario, resolver, &self.config) {
            Ok(ctx) => self.run(ctx).await,
            Err(e) => {
                error!("Scenario {} not started: {}", scenario, e);
                ScenarioReport::rejected(scenario, &e)
            }
        }
    }

    pub async fn run(&self, ctx: TestContext) -> ScenarioReport {
        let timer = Timer::start(format!("scenario {}", ctx.scenario));
        let mut report = ScenarioReport::started(&ctx);
        let mut stack = CleanupStack::new();
        info!(
            "Starting scenario {} (function {}, bucket {}, project {}, region {})",
            ctx.scenario, ctx.function_name, ctx.bucket_name, ctx.project_id, ctx.region
        );

        let outcome = AssertUnwindSafe(self.execute(&ctx, &mut stack, &mut report))
            .catch_unwind()
            .await;

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(panic) => Some(HarnessError::Fault(format!(
                "step panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };

        if let Some(e) = &failure {
            if e.is_fatal() {
                error!("Scenario {} failed: {}", ctx.scenario, e);
            } else {
                warn!("Scenario {} failed: {}", ctx.scenario, e);
            }
            transition(&ctx, &mut report, ScenarioState::Failed);
            report.error = Some(e.into());
        }

        let step = Timer::start("cleanup");
        report.cleanup_failures = stack.unwind().await;
        record_step(&mut report, "cleanup", step);
        transition(&ctx, &mut report, ScenarioState::Cleaned);

        report.status = overall_status(failure.as_ref(), &report.cleanup_failures);
        report.duration_ms = u64::try_from(timer.stop().as_millis()).unwrap_or(u64::MAX);
        info!("{}", report);
        report
    }

    async fn execute(
        &self,
        ctx: &TestContext,
        stack: &mut CleanupStack,
        report: &mut ScenarioReport,
    ) -> HarnessResult<()> {
        // Provision
        let step = Timer::start("provision");
        let provisioner = BucketProvisioner::new(self.infra.clone(), &self.config.bucket_fixture_dir)
            .with_state_dir(ctx.bucket_state_dir());
        let created = provisioner
            .create_bucket(&ctx.project_id, &ctx.bucket_name, &ctx.region)
            .await;
        record_step(report, "provision", step);

        let bucket = created?;
        stack.defer(bucket.destroy_label(), move || async move {
            provisioner.destroy_bucket(&bucket).await
        });
        transition(ctx, report, ScenarioState::ResourceProvisioned);

        // Apply
        let step = Timer::start("apply");
        let module =
            ProvisionedResource::new(ResourceKind::Module, &ctx.function_name, ctx.module_options());
        let applied = self.invoker.apply_module(&module.options).await;
        record_step(report, "apply", step);

        let outputs = match applied {
            Ok(outputs) => {
                self.defer_module_destroy(stack, module);
                outputs
            }
            Err(e) => {
                if self.config.destroy_after_failed_apply {
                    warn!("Apply failed; destroying partially created resources");
                    self.defer_module_destroy(stack, module);
                }
                return Err(e);
            }
        };
        transition(ctx, report, ScenarioState::ModuleApplied);

        // Validate
        let step = Timer::start("validate");
        report.checks = OutputValidator::evaluate(&outputs, &ctx.expectations());
        for check in &report.checks {
            match check.status {
                TestStatus::Fail => warn!("{}", check),
                _ => info!("{}", check),
            }
        }
        let validation = summarize_failures(&report.checks);
        record_step(report, "validate", step);

        // Probe
        let mut probe_failure = None;
        if let Some(output) = ctx.scenario.probe_output() {
            match outputs.get(output).filter(|url| !url.is_empty()) {
                Some(url) => {
                    let step = Timer::start("probe");
                    let result = self
                        .probe
                        .probe(url, &self.config.probe.policy())
                        .await;
                    record_step(report, "probe", step);
                    report.probe = Some(result.clone());
                    probe_failure = result.into_result().err();
                }
                None => {
                    let reason = format!("output {output} missing or empty");
                    warn!("Skipping probe: {}", reason);
                    report.probe_skipped = Some(reason);
                }
            }
        }

        if let Some(e) = combine_failures(probe_failure, validation) {
            return Err(e);
        }
        transition(ctx, report, ScenarioState::Validated);
        Ok(())
    }

    fn defer_module_destroy(&self, stack: &mut CleanupStack, module: ProvisionedResource) {
        let invoker = self.invoker.clone();
        stack.defer(module.destroy_label(), move || async move {
            invoker.destroy_module(&module.options).await
        });
    }
}

/// The probe failure leads; failed checks are appended so neither is lost
fn combine_failures(
    probe: Option<HarnessError>,
    validation: Option<HarnessError>,
) -> Option<HarnessError> {
    match (probe, validation) {
        (Some(HarnessError::Probe(probe)), Some(validation)) => {
            Some(HarnessError::Probe(format!("{probe}; {validation}")))
        }
        (Some(e), _) | (None, Some(e)) => Some(e),
        (None, None) => None,
    }
}

fn transition(ctx: &TestContext, report: &mut ScenarioReport, next: ScenarioState) {
    if let Some(prev) = report.final_state() {
        info!("[{}] {} -> {}", ctx.function_name, prev, next);
    }
    report.states.push(next);
}

fn record_step(report: &mut ScenarioReport, step: &str, timer: Timer) {
    report.steps.push(StepTiming {
        step: step.to_string(),
        duration_ms: u64::try_from(timer.stop().as_millis()).unwrap_or(u64::MAX),
    });
}

/// Validation and probe failures fail the scenario; anything else, a leaked
/// resource included, is an error
fn overall_status(failure: Option<&HarnessError>, cleanup: &[CleanupFailure]) -> TestStatus {
    match failure {
        Some(HarnessError::Validation(_)) | Some(HarnessError::Probe(_)) => TestStatus::Fail,
        Some(_) => TestStatus::Error,
        None if !cleanup.is_empty() => TestStatus::Error,
        None => TestStatus::Pass,
    }
}
