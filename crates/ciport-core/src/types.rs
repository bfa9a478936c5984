//! Core type definitions for the repair loop

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Generation strategy used to produce a candidate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Input + plan only, no prior-attempt context
    #[default]
    Fresh,
    /// Input + plan + previous candidate + diagnostics + repair guidance
    Debug,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fresh => write!(f, "fresh"),
            Self::Debug => write!(f, "debug"),
        }
    }
}

/// One diagnostic line reported by the validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub line: u32,
    pub column: u32,
    pub message: String,
    /// Documentation link the validator attached to the message, if any
    pub reference_url: Option<String>,
}

impl Diagnostic {
    /// `line:column` location string
    pub fn location(&self) -> String {
        format!("{}:{}", self.line, self.column)
    }
}

/// Raw result of running the validator on one candidate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// True iff the validator exited with status zero
    pub passed: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ValidationOutcome {
    pub fn pass() -> Self {
        Self {
            passed: true,
            ..Default::default()
        }
    }

    pub fn fail(stdout: impl Into<String>) -> Self {
        Self {
            passed: false,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }
}

/// A single loop iteration's candidate and how it fared
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    /// 1-based attempt index
    pub index: usize,
    /// Strategy that produced the candidate
    pub strategy: Strategy,
    /// Normalized candidate text (what was validated and persisted)
    pub candidate: String,
    pub outcome: ValidationOutcome,
    /// Diagnostics parsed from the validator output
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    /// Always `diagnostics.len()`; kept for ranking and reports
    pub diagnostic_count: usize,
    /// Where the candidate was written, if persistence succeeded
    pub output_path: Option<PathBuf>,
}

impl Attempt {
    pub fn passed(&self) -> bool {
        self.outcome.passed
    }
}

/// Compact view of an attempt used for ranking and reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptSummary {
    pub index: usize,
    pub passed: bool,
    pub diagnostic_count: usize,
}

impl From<&Attempt> for AttemptSummary {
    fn from(attempt: &Attempt) -> Self {
        Self {
            index: attempt.index,
            passed: attempt.passed(),
            diagnostic_count: attempt.diagnostic_count,
        }
    }
}

/// Rank attempts by ascending diagnostic count.
///
/// The sort is stable, so attempts with equal counts keep generation order.
pub fn rank_attempts(attempts: &[Attempt]) -> Vec<AttemptSummary> {
    let mut ranking: Vec<AttemptSummary> = attempts.iter().map(AttemptSummary::from).collect();
    ranking.sort_by_key(|s| s.diagnostic_count);
    ranking
}

/// Documentation cache key: (reference URL, diagnostic message)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocKey {
    pub url: String,
    pub message: String,
}

impl DocKey {
    pub fn new(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            message: message.into(),
        }
    }
}

/// A summarized documentation page for one (url, message) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocCacheEntry {
    pub url: String,
    pub message: String,
    pub summary: String,
}

impl DocCacheEntry {
    pub fn key(&self) -> DocKey {
        DocKey::new(self.url.clone(), self.message.clone())
    }
}

/// Quality gate judgment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub passed: bool,
    /// Full judge output, fed back as repair guidance on rejection
    pub rationale: String,
}

/// Terminal state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// A candidate passed validation (and the quality gate, if it was approved)
    Done,
    /// Attempts ran out without a passing candidate
    Exhausted,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Done => write!(f, "done"),
            Self::Exhausted => write!(f, "exhausted"),
        }
    }
}
