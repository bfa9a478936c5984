//! Plan step and candidate generation

use ciport_agent::{Completion, LlmClient};
use ciport_core::config::DialectSettings;
use ciport_core::{CiportError, Result, Strategy};
use tracing::{debug, instrument};

use crate::prompt::{build_debug_prompt, build_fresh_prompt, build_plan_prompt, GenerationRequest};

/// Prompt renderer shared by both strategies
pub type PromptBuilder = fn(&GenerationRequest<'_>) -> String;

/// Prompt renderer for a strategy
pub fn prompt_builder(strategy: Strategy) -> PromptBuilder {
    match strategy {
        Strategy::Fresh => build_fresh_prompt,
        Strategy::Debug => build_debug_prompt,
    }
}

/// Produce the migration plan. Called once per run.
#[instrument(skip_all)]
pub async fn generate_plan<L>(llm: &L, dialects: &DialectSettings, input: &str) -> Result<Completion>
where
    L: LlmClient + ?Sized,
{
    let prompt = build_plan_prompt(dialects, input);
    llm.complete(&prompt)
        .await
        .map_err(|e| CiportError::Planning(e.to_string()))
}

/// Produce one raw candidate with the given strategy
#[instrument(skip(llm, request))]
pub async fn generate<L>(
    llm: &L,
    strategy: Strategy,
    request: &GenerationRequest<'_>,
) -> Result<Completion>
where
    L: LlmClient + ?Sized,
{
    let prompt = prompt_builder(strategy)(request);
    debug!("Generation prompt: {} chars", prompt.len());

    llm.complete(&prompt)
        .await
        .map_err(|e| CiportError::Generation(format!("{} strategy: {}", strategy, e)))
}
