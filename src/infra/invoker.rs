//! Module invoker
//!
//! Applies and destroys the module under test through an [`Infrastructure`]
//! engine. Transient provider errors are retried inside the invoker; all
//! other errors surface immediately.

use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::{ApplyResult, InfraError, Infrastructure, ModuleOptions};
use crate::error::{HarnessError, HarnessResult};
use crate::utils::RetryPolicy;

/// Substring that marks an engine error as transient
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryablePattern {
    pub needle: String,
    pub description: String,
}

impl RetryablePattern {
    pub fn new(needle: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            needle: needle.into(),
            description: description.into(),
        }
    }
}

/// Classifies engine errors as retryable or fatal
#[derive(Clone, Debug, Default)]
pub struct RetryClassifier {
    patterns: Vec<RetryablePattern>,
}

impl RetryClassifier {
    /// Classifier that never retries
    #[cfg(test)]
    pub fn none() -> Self {
        Self::default()
    }

    /// Transient conditions commonly seen while applying Terraform modules
    pub fn terraform_defaults() -> Self {
        let defaults = [
            ("error installing provider", "Provider download failed"),
            ("failed to query available provider packages", "Provider registry unreachable"),
            ("timeout while waiting for plugin to start", "Provider plugin start timeout"),
            ("connection reset by peer", "Connection reset"),
            ("tls handshake timeout", "TLS handshake timeout"),
            ("client.timeout exceeded", "HTTP client timeout"),
            ("error 429", "Rate limited"),
            ("ratelimitexceeded", "Rate limited"),
            ("quota exceeded", "Quota exceeded"),
            ("error 503", "Service unavailable"),
            ("error 502", "Bad gateway"),
            ("operation was aborted", "Concurrent operation aborted"),
            ("failedprecondition", "Resource not yet consistent"),
            ("iam.serviceaccounts.actas", "IAM binding not yet propagated"),
            ("is not ready", "Dependent resource not ready"),
        ];

        Self {
            patterns: defaults
                .into_iter()
                .map(|(needle, description)| RetryablePattern::new(needle, description))
                .collect(),
        }
    }

    pub fn with_pattern(mut self, pattern: RetryablePattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    /// Return the matching pattern, if the error is retryable
    pub fn classify(&self, error: &InfraError) -> Option<&RetryablePattern> {
        let text = error.diagnostic_text().to_lowercase();
        self.patterns
            .iter()
            .find(|p| text.contains(&p.needle.to_lowercase()))
    }
}

/// Applies and destroys modules with built-in retry of transient errors
#[derive(Clone)]
pub struct ModuleInvoker {
    infra: Arc<dyn Infrastructure>,
    classifier: RetryClassifier,
    policy: RetryPolicy,
}

impl ModuleInvoker {
    pub fn new(infra: Arc<dyn Infrastructure>, policy: RetryPolicy) -> Self {
        Self {
            infra,
            classifier: RetryClassifier::terraform_defaults(),
            policy,
        }
    }

    pub fn with_classifier(mut self, classifier: RetryClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Apply the module and return its outputs
    pub async fn apply_module(&self, options: &ModuleOptions) -> HarnessResult<ApplyResult> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.infra.apply(options).await {
                Ok(result) => {
                    info!(
                        "Applied {} on attempt {} ({} outputs)",
                        options.name,
                        attempt,
                        result.len()
                    );
                    if result.is_empty() {
                        warn!("Apply of {} returned no outputs; reading them from state", options.name);
                        return self.read_outputs(options).await;
                    }
                    debug!(
                        "Outputs of {}: {}",
                        options.name,
                        result.names().collect::<Vec<_>>().join(", ")
                    );
                    return Ok(result);
                }
                Err(e) => self.retry_or_fail(options, "apply", attempt, e).await?,
            }
        }
    }

    /// Destroy everything the module created
    pub async fn destroy_module(&self, options: &ModuleOptions) -> HarnessResult<()> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.infra.destroy(options).await {
                Ok(()) => {
                    info!("Destroyed {}", options.name);
                    return Ok(());
                }
                Err(e) => self.retry_or_fail(options, "destroy", attempt, e).await?,
            }
        }
    }

    /// Read the outputs of an applied module
    pub async fn read_outputs(&self, options: &ModuleOptions) -> HarnessResult<ApplyResult> {
        self.infra
            .outputs(options)
            .await
            .map_err(|source| HarnessError::Apply {
                module: options.name.clone(),
                attempts: 1,
                source,
            })
    }

    /// Sleep and return `Ok` when the error may be retried, otherwise the
    /// error to surface
    async fn retry_or_fail(
        &self,
        options: &ModuleOptions,
        operation: &str,
        attempt: u32,
        error: InfraError,
    ) -> HarnessResult<()> {
        let retryable = self.classifier.classify(&error);

        match retryable {
            Some(pattern) if self.policy.allows_another(attempt) => {
                let delay = self.policy.delay_after(attempt);
                warn!(
                    "{} of {} failed with retryable error ({}), attempt {}/{}; retrying in {:?}",
                    operation,
                    options.name,
                    pattern.description,
                    attempt,
                    self.policy.max_attempts,
                    delay
                );
                sleep(delay).await;
                Ok(())
            }
            _ => Err(HarnessError::Apply {
                module: options.name.clone(),
                attempts: attempt,
                source: error,
            }),
        }
    }
}
