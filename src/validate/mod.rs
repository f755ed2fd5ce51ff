//! Output validation
//!
//! Reads named module outputs and checks them against a scenario's
//! expectations. Every expectation is evaluated, so one mismatch does not
//! hide the others.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{HarnessError, HarnessResult};
use crate::infra::ApplyResult;
use crate::models::{CheckResult, TestStatus};

/// What an output must satisfy
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "rule", content = "value")]
pub enum Rule {
    NonEmpty,
    Equals(String),
    Contains(String),
}

/// A rule bound to an output name
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectation {
    pub output: String,
    pub rule: Rule,
}

impl Expectation {
    pub fn non_empty(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            rule: Rule::NonEmpty,
        }
    }

    pub fn equals(output: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            rule: Rule::Equals(expected.into()),
        }
    }

    pub fn contains(output: impl Into<String>, needle: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            rule: Rule::Contains(needle.into()),
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.rule {
            Rule::NonEmpty => write!(f, "{} is non-empty", self.output),
            Rule::Equals(expected) => write!(f, "{} == {:?}", self.output, expected),
            Rule::Contains(needle) => write!(f, "{} contains {:?}", self.output, needle),
        }
    }
}

/// Value of output `name`; a validation error when the module did not
/// declare it
pub fn read_output(result: &ApplyResult, name: &str) -> HarnessResult<String> {
    result
        .get(name)
        .map(str::to_string)
        .ok_or_else(|| HarnessError::Validation(format!("output {name} missing")))
}

/// `<function>-sa@<project>.iam.gserviceaccount.com`
pub fn service_account_email(function_name: &str, project_id: &str) -> String {
    format!("{function_name}-sa@{project_id}.iam.gserviceaccount.com")
}

/// Evaluates expectations against module outputs
pub struct OutputValidator;

impl OutputValidator {
    pub fn non_empty(result: &ApplyResult, name: &str) -> HarnessResult<String> {
        let value = read_output(result, name)?;
        if value.is_empty() {
            return Err(HarnessError::Validation(format!(
                "{name}: expected non-empty value"
            )));
        }
        Ok(value)
    }

    pub fn equals(result: &ApplyResult, name: &str, expected: &str) -> HarnessResult<()> {
        let value = read_output(result, name)?;
        if value != expected {
            return Err(HarnessError::Validation(format!(
                "{name}: expected {expected:?}, got {value:?}"
            )));
        }
        Ok(())
    }

    pub fn contains(result: &ApplyResult, name: &str, needle: &str) -> HarnessResult<()> {
        let value = read_output(result, name)?;
        if !value.contains(needle) {
            return Err(HarnessError::Validation(format!(
                "{name}: expected to contain {needle:?}, got {value:?}"
            )));
        }
        Ok(())
    }

    pub fn check(result: &ApplyResult, expectation: &Expectation) -> HarnessResult<()> {
        let name = expectation.output.as_str();
        match &expectation.rule {
            Rule::NonEmpty => Self::non_empty(result, name).map(|_| ()),
            Rule::Equals(expected) => Self::equals(result, name, expected),
            Rule::Contains(needle) => Self::contains(result, name, needle),
        }
    }

    /// Evaluate every expectation. The first check of a missing output fails;
    /// later checks on it are skipped.
    pub fn evaluate(result: &ApplyResult, expectations: &[Expectation]) -> Vec<CheckResult> {
        let mut missing: HashSet<&str> = HashSet::new();

        expectations
            .iter()
            .map(|expectation| {
                let output = expectation.output.as_str();
                let name = expectation.to_string();

                if missing.contains(output) {
                    return CheckResult::skip(name, format!("output {output} missing"));
                }
                if result.get(output).is_none() {
                    missing.insert(output);
                }

                match Self::check(result, expectation) {
                    Ok(()) => CheckResult::pass(name),
                    Err(HarnessError::Validation(msg)) => CheckResult::fail(name, msg),
                    Err(other) => CheckResult::fail(name, other.to_string()),
                }
            })
            .collect()
    }
}

/// One validation error summarizing the failed checks, if any
pub fn summarize_failures(checks: &[CheckResult]) -> Option<HarnessError> {
    let failed: Vec<String> = checks
        .iter()
        .filter(|c| c.status == TestStatus::Fail)
        .map(|c| c.message.clone().unwrap_or_else(|| c.name.clone()))
        .collect();

    if failed.is_empty() {
        return None;
    }
    Some(HarnessError::Validation(format!(
        "{} of {} checks failed: {}",
        failed.len(),
        checks.len(),
        failed.join("; ")
    )))
}
