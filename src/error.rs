//! Harness error taxonomy
//!
//! Every failure a scenario can hit falls into one of these classes. The
//! class decides whether the pipeline stops and how the failure is labelled
//! in the scenario report.

use thiserror::Error;

use crate::infra::InfraError;

/// Errors raised while driving a scenario
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Missing or inconsistent configuration; raised before any resource exists
    #[error("configuration error: {0}")]
    Config(String),

    /// Prerequisite resource could not be created or destroyed
    #[error("provisioning error ({resource}): {source}")]
    Provision {
        resource: String,
        #[source]
        source: InfraError,
    },

    /// Module under test failed to apply, destroy or report outputs
    #[error("apply error ({module}) after {attempts} attempt(s): {source}")]
    Apply {
        module: String,
        attempts: u32,
        #[source]
        source: InfraError,
    },

    /// An output was missing or did not match its expectation
    #[error("validation error: {0}")]
    Validation(String),

    /// The deployed endpoint never answered successfully within the budget
    #[error("probe error: {0}")]
    Probe(String),

    /// A registered cleanup action failed
    #[error("cleanup error ({label}): {message}")]
    Cleanup { label: String, message: String },

    /// A step panicked or otherwise faulted unexpectedly
    #[error("unexpected fault: {0}")]
    Fault(String),
}

impl HarnessError {
    /// Short class label used in reports
    pub fn label(&self) -> &'static str {
        match self {
            HarnessError::Config(_) => "config",
            HarnessError::Provision { .. } => "provision",
            HarnessError::Apply { .. } => "apply",
            HarnessError::Validation(_) => "validation",
            HarnessError::Probe(_) => "probe",
            HarnessError::Cleanup { .. } => "cleanup",
            HarnessError::Fault(_) => "fault",
        }
    }

    /// Whether the error stops the remaining pipeline steps
    pub fn is_fatal(&self) -> bool {
        !matches!(self, HarnessError::Validation(_))
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
