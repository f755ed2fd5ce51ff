//! Infrastructure engine boundary
//!
//! The harness never looks inside a module. It needs three capabilities from
//! the engine: apply, destroy and read outputs. [`Infrastructure`] is that
//! seam; [`TerraformCli`] is the production implementation.

mod invoker;
mod options;
mod outputs;
mod terraform;

use async_trait::async_trait;
use thiserror::Error;

pub use invoker::{ModuleInvoker, RetryClassifier, RetryablePattern};
pub use options::ModuleOptions;
#[cfg(test)]
pub use options::VarValue;
pub use outputs::ApplyResult;
pub use terraform::TerraformCli;

/// Engine errors
#[derive(Error, Debug)]
pub enum InfraError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}: {output}", describe_exit(.exit_code))]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("failed to parse outputs: {0}")]
    OutputParse(String),

    #[error("failed to create state directory {path}: {source}")]
    StateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "signal".to_string(),
    }
}

impl InfraError {
    /// Text searched by the retryable-error classifier
    pub fn diagnostic_text(&self) -> String {
        match self {
            InfraError::Spawn { source, .. } => source.to_string(),
            InfraError::CommandFailed { output, .. } => output.clone(),
            InfraError::OutputParse(msg) => msg.clone(),
            InfraError::StateDir { source, .. } => source.to_string(),
        }
    }
}

/// Apply/destroy/output capability set of an infrastructure engine
#[async_trait]
pub trait Infrastructure: Send + Sync {
    /// Initialize and apply the module, returning its outputs
    async fn apply(&self, options: &ModuleOptions) -> Result<ApplyResult, InfraError>;

    /// Destroy everything the module created
    async fn destroy(&self, options: &ModuleOptions) -> Result<(), InfraError>;

    /// Read the outputs of an applied module
    async fn outputs(&self, options: &ModuleOptions) -> Result<ApplyResult, InfraError>;
}
