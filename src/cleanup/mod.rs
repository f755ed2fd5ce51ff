//! Guaranteed teardown
//!
//! Every resource a scenario creates registers its destroy action here right
//! after creation. Unwinding runs the actions in reverse registration order.
//! Each action is isolated: an error or a panic in one is recorded and the
//! remaining actions still run.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use tracing::{error, info, warn};

use crate::error::{HarnessError, HarnessResult};

type CleanupFuture = Pin<Box<dyn Future<Output = HarnessResult<()>> + Send>>;

struct CleanupAction {
    label: String,
    run: Box<dyn FnOnce() -> CleanupFuture + Send>,
}

/// A cleanup action that did not complete
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupFailure {
    pub label: String,
    pub message: String,
}

impl From<CleanupFailure> for HarnessError {
    fn from(failure: CleanupFailure) -> Self {
        HarnessError::Cleanup {
            label: failure.label,
            message: failure.message,
        }
    }
}

/// LIFO stack of destroy actions
#[derive(Default)]
pub struct CleanupStack {
    actions: Vec<CleanupAction>,
}

impl CleanupStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action to run on unwind
    pub fn defer<F, Fut>(&mut self, label: impl Into<String>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = HarnessResult<()>> + Send + 'static,
    {
        let label = label.into();
        info!("Registered cleanup: {}", label);
        self.actions.push(CleanupAction {
            label,
            run: Box::new(move || Box::pin(action())),
        });
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Labels in registration order
    pub fn labels(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.label.as_str()).collect()
    }

    /// Run every registered action, most recent first
    pub async fn unwind(&mut self) -> Vec<CleanupFailure> {
        let mut failures = Vec::new();
        if self.is_empty() {
            return failures;
        }
        info!("Unwinding {} cleanup action(s)", self.len());

        while let Some(CleanupAction { label, run }) = self.actions.pop() {
            info!("Cleanup: {}", label);
            let outcome = AssertUnwindSafe(async move { run().await })
                .catch_unwind()
                .await;

            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
            };
            error!("Cleanup {} failed: {}", label, message);
            failures.push(CleanupFailure { label, message });
        }

        failures
    }
}

impl Drop for CleanupStack {
    fn drop(&mut self) {
        if !self.is_empty() {
            warn!(
                "Cleanup stack dropped with {} pending action(s): {}",
                self.len(),
                self.labels().join(", ")
            );
        }
    }
}

/// Text of a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
