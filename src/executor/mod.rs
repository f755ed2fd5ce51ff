//! Scenario execution engine
//!
//! Provides sequential and parallel scenario execution.

mod parallel;
mod runner;

pub use parallel::ParallelExecutor;
pub use runner::ScenarioRunner;
