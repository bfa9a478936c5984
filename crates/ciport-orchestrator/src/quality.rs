//! Quality gate
//!
//! Asks a judge model whether a valid candidate is a faithful translation.
//! The judge answers in free text; [`parse_verdict`] is the only place that
//! text is interpreted. Everything downstream works with [`Verdict`].

use ciport_agent::LlmClient;
use ciport_core::config::DialectSettings;
use ciport_core::{CiportError, Result, Verdict};
use tracing::instrument;

use crate::prompt::build_judge_prompt;

/// Lenient verdict parser
///
/// Passes iff some line contains both "verdict" and "pass", compared
/// case-insensitively and per line. No such line means fail.
pub fn parse_verdict(text: &str) -> Verdict {
    let passed = text.lines().any(|line| {
        let line = line.to_lowercase();
        line.contains("verdict") && line.contains("pass")
    });

    Verdict {
        passed,
        rationale: text.trim().to_string(),
    }
}

/// Judge a candidate against the input. Returns the verdict and its cost.
#[instrument(skip_all)]
pub async fn judge<L>(
    llm: &L,
    dialects: &DialectSettings,
    input: &str,
    candidate: &str,
) -> Result<(Verdict, f64)>
where
    L: LlmClient + ?Sized,
{
    let prompt = build_judge_prompt(dialects, input, candidate);
    let completion = llm
        .complete(&prompt)
        .await
        .map_err(|e| CiportError::QualityJudgment(e.to_string()))?;

    Ok((parse_verdict(&completion.text), completion.cost_usd))
}
