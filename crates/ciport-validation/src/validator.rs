//! Validation adapter: run an external checker on a candidate
//!
//! The candidate is written to a transient workflow file, the checker runs
//! against it, and the exit status plus captured output come back as a
//! [`ValidationOutcome`]. A non-zero exit means "invalid candidate". Failing
//! to run the checker at all is an error for the caller.

use async_trait::async_trait;
use ciport_core::config::ValidatorSettings;
use ciport_core::{CiportError, Result, ValidationOutcome};
use std::path::Path;
use std::sync::Mutex;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::diagnostics::DIAGNOSTIC_PREFIX;

const CANDIDATE_FILE: &str = "candidate.yml";

/// Trait for validating candidates (allows mocking in tests)
#[async_trait]
pub trait ArtifactValidator: Send + Sync {
    async fn validate(&self, artifact: &str) -> Result<ValidationOutcome>;

    /// Validator label for logs
    fn name(&self) -> &str;
}

/// Runs `actionlint` (or a compatible checker) on the candidate
#[derive(Debug, Clone)]
pub struct ActionlintValidator {
    command: String,
    args: Vec<String>,
}

impl ActionlintValidator {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    pub fn from_settings(settings: &ValidatorSettings) -> Self {
        Self::new(settings.command.clone(), settings.args.clone())
    }

    async fn write_candidate(dir: &Path, artifact: &str) -> Result<String> {
        let workflows = dir.join(DIAGNOSTIC_PREFIX);
        tokio::fs::create_dir_all(&workflows).await?;
        tokio::fs::write(workflows.join(CANDIDATE_FILE), artifact).await?;
        Ok(format!("{}{}", DIAGNOSTIC_PREFIX, CANDIDATE_FILE))
    }
}

impl Default for ActionlintValidator {
    fn default() -> Self {
        Self::from_settings(&ValidatorSettings::default())
    }
}

#[async_trait]
impl ArtifactValidator for ActionlintValidator {
    #[instrument(skip(self, artifact), fields(validator = %self.command))]
    async fn validate(&self, artifact: &str) -> Result<ValidationOutcome> {
        let workdir = tempfile::TempDir::new()?;
        let relative = Self::write_candidate(workdir.path(), artifact).await?;

        debug!("Executing {} {:?} {}", self.command, self.args, relative);

        let output = Command::new(&self.command)
            .args(&self.args)
            .arg(&relative)
            .current_dir(workdir.path())
            .output()
            .await
            .map_err(|e| {
                CiportError::Validator(format!("Failed to execute {}: {}", self.command, e))
            })?;

        let outcome = ValidationOutcome {
            passed: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !outcome.passed {
            debug!(
                "{} exited with {:?}: {} stdout bytes",
                self.command,
                output.status.code(),
                outcome.stdout.len()
            );
        }

        Ok(outcome)
    }

    fn name(&self) -> &str {
        &self.command
    }
}

/// Mock validator for testing
///
/// Serves scripted outcomes in order, repeating the last one, and records
/// every artifact it was asked to validate.
#[derive(Debug, Default)]
pub struct MockValidator {
    outcomes: Vec<std::result::Result<ValidationOutcome, String>>,
    seen: Mutex<Vec<String>>,
}

impl MockValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcome(mut self, outcome: ValidationOutcome) -> Self {
        self.outcomes.push(Ok(outcome));
        self
    }

    /// Simulate the checker crashing
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.outcomes.push(Err(message.into()));
        self
    }

    /// Artifacts validated so far, in order
    pub fn validated(&self) -> Vec<String> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ArtifactValidator for MockValidator {
    async fn validate(&self, artifact: &str) -> Result<ValidationOutcome> {
        let index = {
            let mut seen = self
                .seen
                .lock()
                .map_err(|_| CiportError::Other("mock state poisoned".into()))?;
            seen.push(artifact.to_string());
            seen.len() - 1
        };

        let scripted = self
            .outcomes
            .get(index)
            .or_else(|| self.outcomes.last())
            .ok_or_else(|| CiportError::Validator("No mock outcome configured".into()))?;

        scripted.clone().map_err(CiportError::Validator)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_sequence() {
        let validator = MockValidator::new()
            .with_outcome(ValidationOutcome::fail(".github/workflows/candidate.yml:1:1: bad"))
            .with_outcome(ValidationOutcome::pass());

        assert!(!validator.validate("a").await.unwrap().passed);
        assert!(validator.validate("b").await.unwrap().passed);
        assert!(validator.validate("c").await.unwrap().passed);
        assert_eq!(validator.validated(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_mock_error_propagates() {
        let validator = MockValidator::new().with_error("segfault");
        let err = validator.validate("x").await.unwrap_err();
        assert!(matches!(err, CiportError::Validator(_)));
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let validator = ActionlintValidator::new("ciport-no-such-validator-binary", vec![]);
        let err = validator.validate("on: push").await.unwrap_err();
        assert!(matches!(err, CiportError::Validator(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status_decides_pass() {
        // `test -s <file>` succeeds for a non-empty candidate
        let validator = ActionlintValidator::new("test", vec!["-s".to_string()]);
        assert!(validator.validate("on: push\n").await.unwrap().passed);
        assert!(!validator.validate("").await.unwrap().passed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_candidate_path_is_under_workflows() {
        let validator = ActionlintValidator::new("ls", vec![]);
        let outcome = validator.validate("jobs: {}").await.unwrap();
        assert!(outcome.passed);
        assert!(outcome.stdout.starts_with(DIAGNOSTIC_PREFIX));
    }
}
