//! Result models
//!
//! Check, scenario and run level results shared by the orchestrator, the
//! executor and the output formatter.

mod check;
mod report;

pub use check::{CheckResult, TestStatus};
pub use report::{RunSummary, ScenarioReport, ScenarioState, StepTiming};
