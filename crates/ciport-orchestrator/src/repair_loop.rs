//! Repair-loop orchestrator
//!
//! Owns the run state and drives the phase machine in [`crate::phase`]:
//! plan once, then generate, normalize and validate until a candidate passes
//! (and, if enabled, is approved by the quality gate) or the attempt budget
//! runs out. Collaborator failures other than documentation fetches abort
//! the run; persistence is fail-open.

use ciport_agent::LlmClient;
use ciport_core::config::{CiportConfig, DialectSettings};
use ciport_core::{
    rank_attempts, Attempt, AttemptSummary, CiportError, Result, RunContext, RunEvent, RunStatus,
    Strategy, ValidationOutcome, Verdict,
};
use ciport_validation::{parse_diagnostics, ArtifactValidator};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, instrument, warn};

use crate::analyst::analyze;
use crate::artifacts::ArtifactStore;
use crate::docs::{process, DocCache, DocFetcher};
use crate::generator::{generate, generate_plan};
use crate::normalizer::normalize;
use crate::phase::{transition, LoopAction, LoopEvent, LoopPhase, LoopPolicy};
use crate::prompt::GenerationRequest;
use crate::quality::judge;

/// Settings for one run
#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// Maximum generate cycles; 0 exhausts immediately
    pub max_attempts: usize,
    pub quality_gate: bool,
    pub thorough: bool,
    /// Concurrent doc fetch+summarize operations per failed attempt
    pub fetch_concurrency: usize,
    pub dialects: DialectSettings,
}

impl LoopSettings {
    pub fn from_config(config: &CiportConfig) -> Self {
        Self {
            max_attempts: config.run.max_attempts,
            quality_gate: config.run.quality_gate,
            thorough: config.run.thorough,
            fetch_concurrency: config.docs.concurrency(),
            dialects: config.dialects.clone(),
        }
    }

    pub fn policy(&self) -> LoopPolicy {
        LoopPolicy {
            quality_gate: self.quality_gate || self.thorough,
            thorough: self.thorough,
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&CiportConfig::default())
    }
}

/// Outcome of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    /// Every attempt in generation order
    pub attempts: Vec<Attempt>,
    /// Attempts by ascending diagnostic count
    pub ranking: Vec<AttemptSummary>,
    /// Last passing candidate, or the last candidate generated if none passed
    pub final_candidate: Option<String>,
    pub final_attempt: Option<usize>,
    pub final_path: Option<PathBuf>,
    /// Whether any attempt passed validation
    pub validation_passed: bool,
    /// Most recent quality verdict, if the gate ran
    pub quality: Option<Verdict>,
    pub total_cost_usd: f64,
    pub plan: Option<String>,
}

impl RunReport {
    /// Process exit status: 0 iff validation passed
    pub fn exit_code(&self) -> i32 {
        if self.validation_passed {
            0
        } else {
            1
        }
    }

    /// Human-readable account of a run that never validated
    pub fn failure_summary(&self) -> String {
        let mut summary = format!(
            "Validation did not pass after {} attempt(s).\n",
            self.attempts.len()
        );

        for attempt in &self.attempts {
            summary.push_str(&format!(
                "  attempt {}: {} diagnostic(s)\n",
                attempt.index, attempt.diagnostic_count
            ));
        }

        if let Some(best) = self.ranking.first() {
            summary.push_str(&format!(
                "Fewest diagnostics: attempt {} ({})\n",
                best.index, best.diagnostic_count
            ));
        }

        match (&self.final_path, self.final_attempt) {
            (Some(path), _) => {
                summary.push_str(&format!("Last candidate written to {}\n", path.display()))
            }
            (None, Some(index)) => {
                summary.push_str(&format!("Last candidate is attempt {}\n", index))
            }
            (None, None) => summary.push_str("No candidate was generated.\n"),
        }

        summary
    }
}

/// Everything the orchestrator tracks during one run
#[derive(Debug, Default)]
struct RunState {
    plan: String,
    strategy: Strategy,
    attempts: Vec<Attempt>,
    total_cost_usd: f64,
    verdict: Option<Verdict>,

    /// Candidate in flight between phases
    raw: String,
    candidate: String,
    candidate_path: Option<PathBuf>,

    /// Context for the next debug generation
    previous: Option<String>,
    diagnostics: Option<String>,
    guidance: Option<String>,
}

impl RunState {
    fn apply(&mut self, action: LoopAction, ctx: &RunContext) {
        match action {
            LoopAction::SwitchToDebug => {
                if self.strategy != Strategy::Debug {
                    ctx.emit(RunEvent::StrategySwitched {
                        from: self.strategy,
                        to: Strategy::Debug,
                    });
                    self.strategy = Strategy::Debug;
                }
            }
            LoopAction::FeedVerdictBack => {
                self.previous = Some(self.candidate.clone());
                self.diagnostics = None;
                self.guidance = self.verdict.as_ref().map(|v| v.rationale.clone());
            }
        }
    }
}

/// Validator output worth showing to a model
fn diagnostic_text(outcome: &ValidationOutcome) -> String {
    if outcome.stdout.trim().is_empty() {
        outcome.stderr.clone()
    } else {
        outcome.stdout.clone()
    }
}

/// Generate-validate-repair loop over an LLM, a validator and a doc fetcher
pub struct RepairLoop<L, V, F> {
    llm: L,
    validator: V,
    fetcher: F,
    settings: LoopSettings,
    cache: DocCache,
    output_dir: Option<PathBuf>,
    source_name: String,
}

impl<L, V, F> RepairLoop<L, V, F>
where
    L: LlmClient,
    V: ArtifactValidator,
    F: DocFetcher,
{
    pub fn new(llm: L, validator: V, fetcher: F, settings: LoopSettings) -> Self {
        Self {
            llm,
            validator,
            fetcher,
            settings,
            cache: DocCache::new(),
            output_dir: None,
            source_name: "input".to_string(),
        }
    }

    /// Seed the documentation cache (e.g. from a previous run)
    pub fn with_cache(mut self, cache: DocCache) -> Self {
        self.cache = cache;
        self
    }

    /// Persist artifacts and the activity log under `dir`
    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.output_dir = Some(dir);
        self
    }

    /// Label for the input in the activity log
    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = name.into();
        self
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn llm(&self) -> &L {
        &self.llm
    }

    pub fn validator(&self) -> &V {
        &self.validator
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Documentation cache, including entries added by runs so far
    pub fn cache(&self) -> &DocCache {
        &self.cache
    }

    pub fn into_cache(self) -> DocCache {
        self.cache
    }

    /// Convert `input`, returning the run report
    ///
    /// Budget exhaustion is a normal outcome reported in the [`RunReport`];
    /// an `Err` means a collaborator failed fatally.
    #[instrument(skip_all, fields(run_id = %ctx.run_id))]
    pub async fn run(&mut self, ctx: &RunContext, input: &str) -> Result<RunReport> {
        let max_attempts = self.settings.max_attempts;
        let policy = self.settings.policy();

        // A zero budget produces nothing, not even a log entry
        let store = match &self.output_dir {
            Some(dir) if max_attempts > 0 => Some(ArtifactStore::new(dir.clone(), ctx)),
            _ => None,
        };

        ctx.emit(RunEvent::RunStarted { max_attempts });
        if let Some(store) = &store {
            store.log_run_start(ctx, &self.source_name, max_attempts).await;
        }

        let mut state = RunState::default();
        let mut phase = LoopPhase::start(max_attempts);

        while !phase.is_terminal() {
            let event = self
                .step(phase, ctx, store.as_ref(), input, &mut state)
                .await?;

            let remaining = max_attempts.saturating_sub(state.attempts.len());
            let next = transition(phase, event, policy, remaining)?;
            for action in next.actions {
                state.apply(action, ctx);
            }
            phase = next.next;
        }

        Ok(self.finish(phase, ctx, store.as_ref(), state).await)
    }

    /// Perform the work of one phase
    async fn step(
        &mut self,
        phase: LoopPhase,
        ctx: &RunContext,
        store: Option<&ArtifactStore>,
        input: &str,
        state: &mut RunState,
    ) -> Result<LoopEvent> {
        let dialects = &self.settings.dialects;

        match phase {
            LoopPhase::Plan => {
                let plan = generate_plan(&self.llm, dialects, input).await?;
                state.total_cost_usd += plan.cost_usd;
                ctx.emit(RunEvent::PlanReady {
                    chars: plan.text.len(),
                    cost_usd: plan.cost_usd,
                });
                state.plan = plan.text;
                Ok(LoopEvent::PlanReady)
            }

            LoopPhase::Generate => {
                let index = state.attempts.len() + 1;
                ctx.emit(RunEvent::AttemptStarted {
                    index,
                    strategy: state.strategy,
                });

                let request = GenerationRequest {
                    dialects,
                    input,
                    plan: &state.plan,
                    previous: state.previous.as_deref(),
                    diagnostics: state.diagnostics.as_deref(),
                    guidance: state.guidance.as_deref(),
                };
                let completion = generate(&self.llm, state.strategy, &request).await?;

                state.total_cost_usd += completion.cost_usd;
                state.raw = completion.text;
                Ok(LoopEvent::CandidateGenerated)
            }

            LoopPhase::Normalize => {
                let index = state.attempts.len() + 1;
                state.candidate = normalize(&state.raw);
                state.candidate_path = match store {
                    Some(store) => store.write_attempt(index, &state.candidate).await,
                    None => None,
                };
                Ok(LoopEvent::CandidateNormalized)
            }

            LoopPhase::Validate => {
                let index = state.attempts.len() + 1;
                let outcome = self.validator.validate(&state.candidate).await?;
                let diagnostics = parse_diagnostics(&outcome.stdout);
                let diagnostic_count = diagnostics.len();

                let attempt = Attempt {
                    index,
                    strategy: state.strategy,
                    candidate: state.candidate.clone(),
                    outcome,
                    diagnostics,
                    diagnostic_count,
                    output_path: state.candidate_path.take(),
                };
                let passed = attempt.passed();

                ctx.emit(RunEvent::CandidateValidated {
                    index,
                    passed,
                    diagnostic_count,
                });
                if let Some(store) = store {
                    store.log_attempt(&attempt).await;
                }

                state.attempts.push(attempt);
                Ok(if passed {
                    LoopEvent::ValidationPassed
                } else {
                    LoopEvent::ValidationFailed
                })
            }

            LoopPhase::Diagnose => {
                let (index, report) = state
                    .attempts
                    .last()
                    .map(|a| (a.index, diagnostic_text(&a.outcome)))
                    .ok_or_else(|| {
                        CiportError::Orchestrator("Diagnose reached without an attempt".into())
                    })?;

                let docs = process(
                    &self.llm,
                    &self.fetcher,
                    &mut self.cache,
                    dialects,
                    &report,
                    &state.candidate,
                    self.settings.fetch_concurrency,
                )
                .await?;
                state.total_cost_usd += docs.cost_usd;
                ctx.emit(RunEvent::DocsResolved {
                    index,
                    fetched: docs.fetched,
                    cached: docs.cached,
                });

                let guidance =
                    analyze(&self.llm, dialects, &report, &state.candidate, &docs.entries).await?;
                state.total_cost_usd += guidance.cost_usd;
                ctx.emit(RunEvent::GuidanceReady {
                    index,
                    chars: guidance.text.len(),
                });

                state.previous = Some(state.candidate.clone());
                state.diagnostics = Some(report);
                state.guidance = Some(guidance.text);
                Ok(LoopEvent::GuidanceReady)
            }

            LoopPhase::QualityCheck => {
                let index = state.attempts.len();
                let (verdict, cost) = judge(&self.llm, dialects, input, &state.candidate).await?;
                state.total_cost_usd += cost;

                ctx.emit(RunEvent::QualityJudged {
                    index,
                    passed: verdict.passed,
                });
                if let Some(store) = store {
                    store.write_quality_report(index, &verdict).await;
                    store.log_verdict(index, &verdict).await;
                }

                let passed = verdict.passed;
                state.verdict = Some(verdict);
                Ok(if passed {
                    LoopEvent::QualityPassed
                } else {
                    LoopEvent::QualityFailed
                })
            }

            LoopPhase::Done | LoopPhase::Exhausted => Err(CiportError::Orchestrator(format!(
                "No work in terminal phase {:?}",
                phase
            ))),
        }
    }

    /// Select the final candidate and assemble the report
    async fn finish(
        &self,
        phase: LoopPhase,
        ctx: &RunContext,
        store: Option<&ArtifactStore>,
        state: RunState,
    ) -> RunReport {
        let status = if phase == LoopPhase::Done {
            RunStatus::Done
        } else {
            RunStatus::Exhausted
        };

        let selected = state
            .attempts
            .iter()
            .rev()
            .find(|a| a.passed())
            .or_else(|| state.attempts.last());
        let final_attempt = selected.map(|a| a.index);
        let final_candidate = selected.map(|a| a.candidate.clone());

        let final_path = match (store, &final_candidate) {
            (Some(store), Some(candidate)) => store.write_final(candidate).await,
            _ => None,
        };

        let validation_passed = state.attempts.iter().any(Attempt::passed);
        if status == RunStatus::Done && state.verdict.as_ref().is_some_and(|v| !v.passed) {
            warn!("Accepting a valid candidate the quality gate did not approve");
        }

        let report = RunReport {
            run_id: ctx.run_id.clone(),
            status,
            ranking: rank_attempts(&state.attempts),
            attempts: state.attempts,
            final_candidate,
            final_attempt,
            final_path,
            validation_passed,
            quality: state.verdict,
            total_cost_usd: state.total_cost_usd,
            plan: (!state.plan.is_empty()).then_some(state.plan),
        };

        ctx.emit(RunEvent::RunFinished {
            status: report.status,
            attempts: report.attempts.len(),
            total_cost_usd: report.total_cost_usd,
        });
        if let Some(store) = store {
            store.log_run_finished(&report).await;
        }

        info!(
            "Run {} {}: {} attempts, validation {}",
            report.run_id,
            report.status,
            report.attempts.len(),
            if report.validation_passed { "passed" } else { "failed" }
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{
        ANALYST_HEADER, GENERATOR_DEBUG_HEADER, GENERATOR_FRESH_HEADER, JUDGE_HEADER,
        PLANNER_HEADER,
    };
    use async_trait::async_trait;
    use ciport_agent::MockLlmClient;
    use ciport_validation::MockValidator;

    struct NoDocs;

    #[async_trait]
    impl DocFetcher for NoDocs {
        async fn fetch(&self, url: &str) -> String {
            format!("page {}", url)
        }
    }

    fn settings(max_attempts: usize) -> LoopSettings {
        LoopSettings {
            max_attempts,
            ..LoopSettings::default()
        }
    }

    fn failing() -> ValidationOutcome {
        ValidationOutcome::fail(
            ".github/workflows/candidate.yml:1:1: \"runs-on\" section is missing [syntax-check]\n",
        )
    }

    #[tokio::test]
    async fn test_first_attempt_passes() {
        let llm = MockLlmClient::new()
            .with_response(PLANNER_HEADER, "plan")
            .with_response(GENERATOR_FRESH_HEADER, "```yaml\non: push\n```")
            .with_cost(0.1);
        let validator = MockValidator::new().with_outcome(ValidationOutcome::pass());

        let mut repair = RepairLoop::new(llm, validator, NoDocs, settings(3));
        let report = repair.run(&RunContext::tracing(), "stages: [build]").await.unwrap();

        assert_eq!(report.status, RunStatus::Done);
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.final_candidate.as_deref(), Some("on: push\n"));
        assert_eq!(report.plan.as_deref(), Some("plan"));
        assert_eq!(report.exit_code(), 0);
        assert!((report.total_cost_usd - 0.2).abs() < 1e-9);
        assert_eq!(repair.validator().validated(), vec!["on: push\n"]);
    }

    #[tokio::test]
    async fn test_exhaustion_keeps_last_candidate() {
        let llm = MockLlmClient::new()
            .with_response(PLANNER_HEADER, "plan")
            .with_response(GENERATOR_FRESH_HEADER, "one")
            .with_response(GENERATOR_DEBUG_HEADER, "two")
            .with_response(ANALYST_HEADER, "add runs-on");
        let validator = MockValidator::new().with_outcome(failing());

        let mut repair = RepairLoop::new(llm, validator, NoDocs, settings(2));
        let report = repair.run(&RunContext::tracing(), "x").await.unwrap();

        assert_eq!(report.status, RunStatus::Exhausted);
        assert_eq!(report.attempts.len(), 2);
        assert_eq!(report.final_attempt, Some(2));
        assert_eq!(report.final_candidate.as_deref(), Some("two"));
        assert_eq!(report.exit_code(), 1);
        // No guidance is built after the final attempt
        assert_eq!(repair.llm().call_count(ANALYST_HEADER), 1);

        let summary = report.failure_summary();
        assert!(summary.contains("after 2 attempt(s)"));
        assert!(summary.contains("attempt 1: 1 diagnostic(s)"));
        assert!(summary.contains("Last candidate is attempt 2"));
    }

    #[tokio::test]
    async fn test_validator_error_is_fatal() {
        let llm = MockLlmClient::new()
            .with_response(PLANNER_HEADER, "plan")
            .with_response(GENERATOR_FRESH_HEADER, "c");
        let validator = MockValidator::new().with_error("actionlint crashed");

        let mut repair = RepairLoop::new(llm, validator, NoDocs, settings(3));
        let err = repair.run(&RunContext::tracing(), "x").await.unwrap_err();
        assert!(matches!(err, CiportError::Validator(_)));
    }

    #[tokio::test]
    async fn test_quality_rejection_without_thorough_is_accepted() {
        let llm = MockLlmClient::new()
            .with_response(PLANNER_HEADER, "plan")
            .with_response(GENERATOR_FRESH_HEADER, "c")
            .with_response(JUDGE_HEADER, "Missing deploy job.\nVerdict: FAIL");
        let validator = MockValidator::new().with_outcome(ValidationOutcome::pass());

        let mut repair = RepairLoop::new(
            llm,
            validator,
            NoDocs,
            LoopSettings {
                quality_gate: true,
                ..settings(3)
            },
        );
        let report = repair.run(&RunContext::tracing(), "x").await.unwrap();

        assert_eq!(report.status, RunStatus::Done);
        assert_eq!(report.attempts.len(), 1);
        assert!(!report.quality.as_ref().unwrap().passed);
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_diagnostic_text_falls_back_to_stderr() {
        let outcome = ValidationOutcome {
            passed: false,
            stdout: "  \n".into(),
            stderr: "config error".into(),
        };
        assert_eq!(diagnostic_text(&outcome), "config error");
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = CiportConfig::default();
        config.run.thorough = true;
        config.docs.fetch_concurrency = 0;

        let settings = LoopSettings::from_config(&config);
        assert!(settings.policy().quality_gate);
        assert_eq!(settings.fetch_concurrency, 1);
    }
}
