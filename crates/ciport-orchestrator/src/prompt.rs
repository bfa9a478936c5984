//! Prompt builders for every model-backed step
//!
//! Each prompt opens with a role header so logs (and test doubles) can tell
//! the steps apart. Prompts are stateless: everything a step needs is
//! rendered into its text.

use ciport_core::config::DialectSettings;
use ciport_core::DocCacheEntry;

pub const PLANNER_HEADER: &str = "# CIPORT PLANNER";
pub const GENERATOR_FRESH_HEADER: &str = "# CIPORT GENERATOR (FRESH)";
pub const GENERATOR_DEBUG_HEADER: &str = "# CIPORT GENERATOR (DEBUG)";
pub const SUMMARIZER_HEADER: &str = "# CIPORT DOC SUMMARIZER";
pub const ANALYST_HEADER: &str = "# CIPORT ERROR ANALYST";
pub const JUDGE_HEADER: &str = "# CIPORT QUALITY JUDGE";

/// Validator output is cut to this many characters before prompting
const MAX_DIAGNOSTIC_CHARS: usize = 8000;

/// Everything a generation strategy may draw on
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub dialects: &'a DialectSettings,
    pub input: &'a str,
    pub plan: &'a str,
    /// Previous candidate (debug only)
    pub previous: Option<&'a str>,
    /// Raw validator output for the previous candidate (debug only)
    pub diagnostics: Option<&'a str>,
    /// Consolidated repair guidance (debug only)
    pub guidance: Option<&'a str>,
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max).collect();
        format!("{}...[truncated]", cut)
    } else {
        text.to_string()
    }
}

fn fenced(prompt: &mut String, lang: &str, body: &str) {
    prompt.push_str("```");
    prompt.push_str(lang);
    prompt.push('\n');
    prompt.push_str(body.trim_end());
    prompt.push_str("\n```\n\n");
}

fn output_instructions(prompt: &mut String, dialects: &DialectSettings) {
    prompt.push_str("## OUTPUT\n\n");
    prompt.push_str(&format!(
        "Respond with the complete {} workflow only, in a single ```yaml fenced block. \
         No commentary before or after it.\n",
        dialects.target
    ));
}

/// Prompt for the one-time migration plan
pub fn build_plan_prompt(dialects: &DialectSettings, input: &str) -> String {
    let mut prompt = format!("{}\n\n", PLANNER_HEADER);

    prompt.push_str(&format!(
        "You are migrating a {} pipeline to {}. Study the pipeline below and write a \
         migration plan: list every job, stage, variable, cache, artifact, service, rule \
         and include, and say how each maps onto {} constructs. Call out anything with no \
         direct equivalent and how to emulate it.\n\n",
        dialects.source, dialects.target, dialects.target
    ));

    prompt.push_str(&format!("## {} PIPELINE\n\n", dialects.source.to_uppercase()));
    fenced(&mut prompt, "yaml", input);

    prompt.push_str("Respond with the plan as a numbered Markdown list.\n");
    prompt
}

/// Fresh strategy: input and plan only
pub fn build_fresh_prompt(req: &GenerationRequest<'_>) -> String {
    let mut prompt = format!("{}\n\n", GENERATOR_FRESH_HEADER);

    prompt.push_str(&format!(
        "Translate the {} pipeline below into an equivalent {} workflow, following the plan.\n\n",
        req.dialects.source, req.dialects.target
    ));

    prompt.push_str("## PLAN\n\n");
    prompt.push_str(req.plan.trim());
    prompt.push_str("\n\n");

    prompt.push_str("## SOURCE PIPELINE\n\n");
    fenced(&mut prompt, "yaml", req.input);

    output_instructions(&mut prompt, req.dialects);
    prompt
}

/// Debug strategy: input, plan, previous candidate, diagnostics and guidance
pub fn build_debug_prompt(req: &GenerationRequest<'_>) -> String {
    let mut prompt = format!("{}\n\n", GENERATOR_DEBUG_HEADER);

    prompt.push_str(&format!(
        "A previous attempt to translate this {} pipeline into {} was rejected. \
         Fix every problem listed below while keeping the translation faithful to the source.\n\n",
        req.dialects.source, req.dialects.target
    ));

    prompt.push_str("## PLAN\n\n");
    prompt.push_str(req.plan.trim());
    prompt.push_str("\n\n");

    prompt.push_str("## SOURCE PIPELINE\n\n");
    fenced(&mut prompt, "yaml", req.input);

    if let Some(previous) = req.previous {
        prompt.push_str("## PREVIOUS ATTEMPT\n\n");
        fenced(&mut prompt, "yaml", previous);
    }

    if let Some(diagnostics) = req.diagnostics.filter(|d| !d.trim().is_empty()) {
        prompt.push_str("## VALIDATOR OUTPUT\n\n");
        fenced(&mut prompt, "", &truncate(diagnostics, MAX_DIAGNOSTIC_CHARS));
    }

    if let Some(guidance) = req.guidance.filter(|g| !g.trim().is_empty()) {
        prompt.push_str("## REPAIR GUIDANCE\n\n");
        prompt.push_str("You MUST address all of the following:\n\n");
        prompt.push_str(guidance.trim());
        prompt.push_str("\n\n");
    }

    output_instructions(&mut prompt, req.dialects);
    prompt
}

/// Prompt summarizing how one documentation page bears on one error
pub fn build_summary_prompt(
    dialects: &DialectSettings,
    message: &str,
    url: &str,
    page: &str,
    candidate: &str,
) -> String {
    let mut prompt = format!("{}\n\n", SUMMARIZER_HEADER);

    prompt.push_str(&format!(
        "The {} validator rejected a workflow with the error below and pointed at a \
         documentation page. Summarize only what the documentation says that explains this \
         error and how to fix it in this specific workflow. Be concrete and brief.\n\n",
        dialects.target
    ));

    prompt.push_str("## ERROR\n\n");
    prompt.push_str(message);
    prompt.push_str("\n\n");

    prompt.push_str(&format!("## DOCUMENTATION ({})\n\n", url));
    prompt.push_str(page.trim());
    prompt.push_str("\n\n");

    prompt.push_str("## WORKFLOW\n\n");
    fenced(&mut prompt, "yaml", candidate);
    prompt
}

/// Prompt consolidating diagnostics and doc summaries into repair guidance
pub fn build_analysis_prompt(
    dialects: &DialectSettings,
    diagnostics: &str,
    candidate: &str,
    docs: &[DocCacheEntry],
) -> String {
    let mut prompt = format!("{}\n\n", ANALYST_HEADER);

    prompt.push_str(&format!(
        "A {} workflow failed validation. Explain the root cause of each error and give \
         precise, ordered instructions for fixing all of them in one pass.\n\n",
        dialects.target
    ));

    prompt.push_str("## VALIDATOR OUTPUT\n\n");
    fenced(&mut prompt, "", &truncate(diagnostics, MAX_DIAGNOSTIC_CHARS));

    if !docs.is_empty() {
        prompt.push_str("## DOCUMENTATION NOTES\n\n");
        for entry in docs {
            prompt.push_str(&format!("### {}\n", entry.message));
            prompt.push_str(&format!("Source: {}\n\n", entry.url));
            prompt.push_str(entry.summary.trim());
            prompt.push_str("\n\n");
        }
    }

    prompt.push_str("## WORKFLOW\n\n");
    fenced(&mut prompt, "yaml", candidate);
    prompt
}

/// Prompt asking whether a valid candidate is a faithful translation
pub fn build_judge_prompt(dialects: &DialectSettings, input: &str, candidate: &str) -> String {
    let mut prompt = format!("{}\n\n", JUDGE_HEADER);

    prompt.push_str(&format!(
        "Decide whether the {} workflow is a faithful, semantically equivalent translation \
         of the {} pipeline: same jobs, ordering, triggers, variables, caches, artifacts and \
         conditions. List every discrepancy you find.\n\n",
        dialects.target, dialects.source
    ));

    prompt.push_str("## SOURCE PIPELINE\n\n");
    fenced(&mut prompt, "yaml", input);

    prompt.push_str("## TRANSLATED WORKFLOW\n\n");
    fenced(&mut prompt, "yaml", candidate);

    prompt.push_str("End your answer with exactly one line: `Verdict: PASS` or `Verdict: FAIL`.\n");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(dialects: &'a DialectSettings) -> GenerationRequest<'a> {
        GenerationRequest {
            dialects,
            input: "build:\n  script: make",
            plan: "1. map build job",
            previous: Some("jobs: {}"),
            diagnostics: Some(".github/workflows/candidate.yml:1:1: runs-on missing"),
            guidance: Some("Add runs-on: ubuntu-latest"),
        }
    }

    #[test]
    fn test_fresh_prompt_has_no_history() {
        let dialects = DialectSettings::default();
        let prompt = build_fresh_prompt(&request(&dialects));

        assert!(prompt.starts_with(GENERATOR_FRESH_HEADER));
        assert!(prompt.contains("1. map build job"));
        assert!(prompt.contains("script: make"));
        assert!(!prompt.contains("PREVIOUS ATTEMPT"));
        assert!(!prompt.contains("runs-on missing"));
    }

    #[test]
    fn test_debug_prompt_includes_history() {
        let dialects = DialectSettings::default();
        let prompt = build_debug_prompt(&request(&dialects));

        assert!(prompt.starts_with(GENERATOR_DEBUG_HEADER));
        assert!(prompt.contains("## PREVIOUS ATTEMPT"));
        assert!(prompt.contains("runs-on missing"));
        assert!(prompt.contains("Add runs-on: ubuntu-latest"));
    }

    #[test]
    fn test_debug_prompt_skips_empty_sections() {
        let dialects = DialectSettings::default();
        let req = GenerationRequest {
            diagnostics: Some("   "),
            guidance: None,
            ..request(&dialects)
        };
        let prompt = build_debug_prompt(&req);
        assert!(!prompt.contains("VALIDATOR OUTPUT"));
        assert!(!prompt.contains("REPAIR GUIDANCE"));
    }

    #[test]
    fn test_analysis_prompt_lists_docs() {
        let dialects = DialectSettings::default();
        let docs = vec![DocCacheEntry {
            url: "https://docs.example.com/jobs".into(),
            message: "unexpected key".into(),
            summary: "Use steps instead of script.".into(),
        }];
        let prompt = build_analysis_prompt(&dialects, "err", "jobs: {}", &docs);
        assert!(prompt.contains("Source: https://docs.example.com/jobs"));
        assert!(prompt.contains("Use steps instead of script."));
    }

    #[test]
    fn test_judge_prompt_requests_verdict_line() {
        let dialects = DialectSettings::default();
        let prompt = build_judge_prompt(&dialects, "a: 1", "b: 2");
        assert!(prompt.contains("Verdict: PASS"));
        assert!(prompt.contains("GitLab CI"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 3), "abc...[truncated]");
    }
}
