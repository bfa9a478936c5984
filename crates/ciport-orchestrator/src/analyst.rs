//! Error analyst: one model call turning diagnostics and doc summaries into
//! consolidated repair guidance for the next generation

use ciport_agent::{Completion, LlmClient};
use ciport_core::config::DialectSettings;
use ciport_core::{CiportError, DocCacheEntry, Result};
use tracing::instrument;

use crate::prompt::build_analysis_prompt;

#[instrument(skip_all, fields(docs = docs.len()))]
pub async fn analyze<L>(
    llm: &L,
    dialects: &DialectSettings,
    diagnostics: &str,
    candidate: &str,
    docs: &[DocCacheEntry],
) -> Result<Completion>
where
    L: LlmClient + ?Sized,
{
    let prompt = build_analysis_prompt(dialects, diagnostics, candidate, docs);
    llm.complete(&prompt)
        .await
        .map_err(|e| CiportError::Analysis(e.to_string()))
}
