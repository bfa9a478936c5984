//! End-to-end repair loop scenarios against scripted collaborators

use async_trait::async_trait;
use ciport_agent::MockLlmClient;
use ciport_core::{
    CiportError, DocCacheEntry, FanoutSink, MemorySink, RunContext, RunEvent, RunStatus, Strategy,
    ValidationOutcome,
};
use ciport_orchestrator::prompt::{
    ANALYST_HEADER, GENERATOR_DEBUG_HEADER, GENERATOR_FRESH_HEADER, JUDGE_HEADER, PLANNER_HEADER,
    SUMMARIZER_HEADER,
};
use ciport_orchestrator::{DocCache, DocFetcher, LoopSettings, RepairLoop};
use ciport_validation::MockValidator;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const SOURCE: &str = "stages: [build]\nbuild:\n  stage: build\n  script: make\n";

const BROKEN: &str = "```yaml\non: push\njobs:\n  build:\n    script: make\n```";
const FIXED: &str = "on: push\njobs:\n  build:\n    runs-on: ubuntu-latest\n    steps:\n      - run: make\n";

const DOC_URL: &str = "https://docs.github.com/en/actions/using-jobs";
const DOC_MESSAGE: &str = r#"unexpected key "script" for "job" section"#;

fn doc_failure() -> ValidationOutcome {
    ValidationOutcome::fail(format!(
        ".github/workflows/candidate.yml:4:5: {}. see {} for more details [syntax-check]\n\
         4 |     script: make\n\
         \x20 |     ^~~~~~~\n",
        DOC_MESSAGE, DOC_URL
    ))
}

#[derive(Default)]
struct CountingFetcher {
    urls: Mutex<Vec<String>>,
}

impl CountingFetcher {
    fn count(&self) -> usize {
        self.urls.lock().unwrap().len()
    }
}

#[async_trait]
impl DocFetcher for CountingFetcher {
    async fn fetch(&self, url: &str) -> String {
        self.urls.lock().unwrap().push(url.to_string());
        "Each job needs runs-on and a list of steps.".to_string()
    }
}

fn llm() -> MockLlmClient {
    MockLlmClient::new()
        .with_response(PLANNER_HEADER, "1. build job -> jobs.build with runs-on")
        .with_response(GENERATOR_FRESH_HEADER, BROKEN)
        .with_response(GENERATOR_DEBUG_HEADER, FIXED)
        .with_response(SUMMARIZER_HEADER, "Replace script with steps and add runs-on.")
        .with_response(ANALYST_HEADER, "Move the script into a run step.")
}

fn settings(max_attempts: usize) -> LoopSettings {
    LoopSettings {
        max_attempts,
        ..LoopSettings::default()
    }
}

fn thorough(max_attempts: usize) -> LoopSettings {
    LoopSettings {
        quality_gate: true,
        thorough: true,
        ..settings(max_attempts)
    }
}

#[tokio::test]
async fn test_fails_once_then_converges() {
    let validator = MockValidator::new()
        .with_outcome(doc_failure())
        .with_outcome(ValidationOutcome::pass());

    let mut repair = RepairLoop::new(llm(), validator, CountingFetcher::default(), settings(3));
    let report = repair.run(&RunContext::tracing(), SOURCE).await.unwrap();

    assert_eq!(report.status, RunStatus::Done);
    assert_eq!(report.attempts.len(), 2);
    assert_eq!(report.final_attempt, Some(2));
    assert_eq!(report.final_candidate.as_deref(), Some(FIXED));
    assert_eq!(report.exit_code(), 0);

    assert_eq!(report.attempts[0].strategy, Strategy::Fresh);
    assert_eq!(report.attempts[0].diagnostic_count, 1);
    let diagnostic = &report.attempts[0].diagnostics[0];
    assert_eq!(diagnostic.location(), "4:5");
    assert_eq!(diagnostic.reference_url.as_deref(), Some(DOC_URL));
    assert!(report.attempts[1].diagnostics.is_empty());
    assert_eq!(report.attempts[1].strategy, Strategy::Debug);

    // One miss: one fetch, one summary
    assert_eq!(repair.fetcher().count(), 1);
    assert_eq!(repair.llm().call_count(SUMMARIZER_HEADER), 1);
    assert_eq!(repair.llm().call_count(PLANNER_HEADER), 1);

    // The debug prompt carries the previous candidate, raw diagnostics and guidance
    let debug_prompt = repair
        .llm()
        .calls()
        .into_iter()
        .find(|p| p.contains(GENERATOR_DEBUG_HEADER))
        .unwrap();
    assert!(debug_prompt.contains("    script: make"));
    assert!(debug_prompt.contains(DOC_URL));
    assert!(debug_prompt.contains("Move the script into a run step."));

    // Fence markers never reach the validator
    assert!(repair.validator().validated().iter().all(|c| !c.contains("```")));

    assert_eq!(repair.cache().len(), 1);
    assert_eq!(repair.cache().entries()[0].url, DOC_URL);
    assert_eq!(repair.cache().entries()[0].message, DOC_MESSAGE);
}

#[tokio::test]
async fn test_thorough_mode_retries_rejected_valid_candidate() {
    let llm = llm()
        .with_response(JUDGE_HEADER, "The deploy stage was dropped.\nVerdict: FAIL")
        .with_response(JUDGE_HEADER, "All stages map cleanly.\nVerdict: PASS");
    let validator = MockValidator::new().with_outcome(ValidationOutcome::pass());

    let mut repair = RepairLoop::new(llm, validator, CountingFetcher::default(), thorough(3));
    let report = repair.run(&RunContext::tracing(), SOURCE).await.unwrap();

    assert_eq!(report.status, RunStatus::Done);
    assert_eq!(report.attempts.len(), 2);
    assert!(report.attempts.iter().all(|a| a.passed()));
    assert_eq!(report.attempts[1].strategy, Strategy::Debug);
    assert!(report.quality.as_ref().unwrap().passed);

    // The rejection rationale is the guidance for attempt 2
    let debug_prompt = repair
        .llm()
        .calls()
        .into_iter()
        .find(|p| p.contains(GENERATOR_DEBUG_HEADER))
        .unwrap();
    assert!(debug_prompt.contains("The deploy stage was dropped."));
    assert!(!debug_prompt.contains("VALIDATOR OUTPUT"));

    // Valid candidates never trigger docs or analysis
    assert_eq!(repair.llm().call_count(ANALYST_HEADER), 0);
    assert_eq!(repair.fetcher().count(), 0);
}

#[tokio::test]
async fn test_strategy_never_reverts_to_fresh() {
    let llm = llm()
        .with_response(JUDGE_HEADER, "Verdict: FAIL")
        .with_response(JUDGE_HEADER, "Verdict: PASS");
    let validator = MockValidator::new()
        .with_outcome(doc_failure())
        .with_outcome(ValidationOutcome::pass())
        .with_outcome(doc_failure())
        .with_outcome(ValidationOutcome::pass());

    let sink = Arc::new(MemorySink::new());
    let ctx = RunContext::new(sink.clone());

    let mut repair = RepairLoop::new(llm, validator, CountingFetcher::default(), thorough(5));
    let report = repair.run(&ctx, SOURCE).await.unwrap();

    let strategies: Vec<Strategy> = report.attempts.iter().map(|a| a.strategy).collect();
    assert_eq!(
        strategies,
        vec![
            Strategy::Fresh,
            Strategy::Debug,
            Strategy::Debug,
            Strategy::Debug
        ]
    );
    assert_eq!(report.status, RunStatus::Done);
    assert_eq!(repair.llm().call_count(GENERATOR_FRESH_HEADER), 1);

    let switches = sink
        .events()
        .into_iter()
        .filter(|e| matches!(e, RunEvent::StrategySwitched { .. }))
        .count();
    assert_eq!(switches, 1);
}

#[tokio::test]
async fn test_attempts_never_exceed_budget() {
    for max_attempts in 1..=4 {
        let validator = MockValidator::new().with_outcome(doc_failure());
        let mut repair = RepairLoop::new(
            llm(),
            validator,
            CountingFetcher::default(),
            settings(max_attempts),
        );
        let report = repair.run(&RunContext::tracing(), SOURCE).await.unwrap();

        assert_eq!(report.status, RunStatus::Exhausted);
        assert_eq!(report.attempts.len(), max_attempts);
        assert_eq!(repair.validator().validated().len(), max_attempts);
        assert_eq!(repair.llm().call_count("# CIPORT GENERATOR"), max_attempts);
        assert_eq!(repair.llm().call_count(ANALYST_HEADER), max_attempts - 1);
        assert_eq!(report.exit_code(), 1);
        assert!(report.final_candidate.is_some());
    }
}

#[tokio::test]
async fn test_zero_budget_exhausts_without_work() {
    let output = TempDir::new().unwrap();
    let runs = output.path().join("runs");
    let validator = MockValidator::new().with_outcome(ValidationOutcome::pass());

    let mut repair = RepairLoop::new(llm(), validator, CountingFetcher::default(), settings(0))
        .with_output_dir(runs.clone());
    let report = repair.run(&RunContext::tracing(), SOURCE).await.unwrap();

    assert_eq!(report.status, RunStatus::Exhausted);
    assert!(report.attempts.is_empty());
    assert!(report.final_candidate.is_none());
    assert!(report.plan.is_none());
    assert_eq!(report.exit_code(), 1);
    assert!(repair.llm().calls().is_empty());
    assert!(!runs.exists());
    assert!(report.failure_summary().contains("No candidate was generated."));
}

#[tokio::test]
async fn test_repeated_diagnostic_is_summarized_once() {
    let validator = MockValidator::new().with_outcome(doc_failure());
    let sink = Arc::new(MemorySink::new());

    let mut repair = RepairLoop::new(llm(), validator, CountingFetcher::default(), settings(4));
    let report = repair.run(&RunContext::new(sink.clone()), SOURCE).await.unwrap();

    assert_eq!(report.attempts.len(), 4);
    assert_eq!(repair.fetcher().count(), 1);
    assert_eq!(repair.llm().call_count(SUMMARIZER_HEADER), 1);

    let resolved: Vec<(usize, usize)> = sink
        .events()
        .into_iter()
        .filter_map(|e| match e {
            RunEvent::DocsResolved {
                fetched, cached, ..
            } => Some((fetched, cached)),
            _ => None,
        })
        .collect();
    assert_eq!(resolved, vec![(1, 0), (0, 1), (0, 1)]);
}

#[tokio::test]
async fn test_seeded_cache_skips_fetch() {
    let seeded = DocCache::seed(vec![DocCacheEntry {
        url: DOC_URL.to_string(),
        message: DOC_MESSAGE.to_string(),
        summary: "from a previous run".to_string(),
    }]);
    let validator = MockValidator::new()
        .with_outcome(doc_failure())
        .with_outcome(ValidationOutcome::pass());

    let mut repair = RepairLoop::new(llm(), validator, CountingFetcher::default(), settings(3))
        .with_cache(seeded);
    repair.run(&RunContext::tracing(), SOURCE).await.unwrap();

    assert_eq!(repair.fetcher().count(), 0);
    assert_eq!(repair.llm().call_count(SUMMARIZER_HEADER), 0);

    let analysis_prompt = repair
        .llm()
        .calls()
        .into_iter()
        .find(|p| p.contains(ANALYST_HEADER))
        .unwrap();
    assert!(analysis_prompt.contains("from a previous run"));

    let cache = repair.into_cache();
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.entries()[0].summary, "from a previous run");
}

#[tokio::test]
async fn test_valid_candidate_survives_later_failure() {
    let llm = llm().with_response(JUDGE_HEADER, "Verdict: FAIL");
    let validator = MockValidator::new()
        .with_outcome(ValidationOutcome::pass())
        .with_outcome(doc_failure());

    let mut repair = RepairLoop::new(llm, validator, CountingFetcher::default(), thorough(2));
    let report = repair.run(&RunContext::tracing(), SOURCE).await.unwrap();

    assert_eq!(report.status, RunStatus::Exhausted);
    assert_eq!(report.attempts.len(), 2);
    assert!(report.validation_passed);
    assert_eq!(report.final_attempt, Some(1));
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn test_plan_failure_aborts_run() {
    let llm = MockLlmClient::new().with_failure(PLANNER_HEADER, "invalid api key");
    let validator = MockValidator::new().with_outcome(ValidationOutcome::pass());

    let mut repair = RepairLoop::new(llm, validator, CountingFetcher::default(), settings(3));
    let err = repair.run(&RunContext::tracing(), SOURCE).await.unwrap_err();

    assert!(matches!(err, CiportError::Planning(_)));
    assert!(repair.validator().validated().is_empty());
}

#[tokio::test]
async fn test_analysis_failure_aborts_run() {
    let llm = MockLlmClient::new()
        .with_response(PLANNER_HEADER, "plan")
        .with_response(GENERATOR_FRESH_HEADER, BROKEN)
        .with_response(SUMMARIZER_HEADER, "summary")
        .with_failure(ANALYST_HEADER, "overloaded");
    let validator = MockValidator::new().with_outcome(doc_failure());

    let mut repair = RepairLoop::new(llm, validator, CountingFetcher::default(), settings(3));
    let err = repair.run(&RunContext::tracing(), SOURCE).await.unwrap_err();

    assert!(matches!(err, CiportError::Analysis(_)));
    assert_eq!(repair.validator().validated().len(), 1);
}

#[tokio::test]
async fn test_generation_failure_aborts_run() {
    let llm = MockLlmClient::new()
        .with_response(PLANNER_HEADER, "plan")
        .with_failure(GENERATOR_FRESH_HEADER, "context length exceeded");
    let validator = MockValidator::new().with_outcome(ValidationOutcome::pass());

    let mut repair = RepairLoop::new(llm, validator, CountingFetcher::default(), settings(3));
    let err = repair.run(&RunContext::tracing(), SOURCE).await.unwrap_err();
    assert!(matches!(err, CiportError::Generation(_)));
}

#[tokio::test]
async fn test_artifacts_are_written() {
    let output = TempDir::new().unwrap();
    let runs = output.path().join("runs");
    let validator = MockValidator::new()
        .with_outcome(doc_failure())
        .with_outcome(ValidationOutcome::pass());
    let ctx = RunContext::tracing();
    let slug = ctx.timestamp_slug();

    let mut repair = RepairLoop::new(llm(), validator, CountingFetcher::default(), settings(3))
        .with_output_dir(runs.clone())
        .with_source_name(".gitlab-ci.yml");
    let report = repair.run(&ctx, SOURCE).await.unwrap();

    assert!(runs.join(format!("{}_attempt_1.yml", slug)).exists());
    assert!(runs.join(format!("{}_attempt_2.yml", slug)).exists());
    assert_eq!(
        report.attempts[0].output_path.as_deref(),
        Some(runs.join(format!("{}_attempt_1.yml", slug)).as_path())
    );

    let final_path = report.final_path.clone().unwrap();
    assert_eq!(final_path, runs.join(format!("{}_final.yml", slug)));
    assert_eq!(std::fs::read_to_string(final_path).unwrap(), FIXED);

    let activity = std::fs::read_to_string(runs.join("activity.md")).unwrap();
    assert!(activity.contains("**Source**: .gitlab-ci.yml"));
    assert!(activity.contains("### Attempt 2 (debug strategy)"));
    assert!(activity.contains("**Status**: done"));
}

#[tokio::test]
async fn test_fanout_sink_receives_full_timeline() {
    let validator = MockValidator::new()
        .with_outcome(doc_failure())
        .with_outcome(ValidationOutcome::pass());
    let first = Arc::new(MemorySink::new());
    let second = Arc::new(MemorySink::new());
    let ctx = RunContext::new(Arc::new(
        FanoutSink::new().with(first.clone()).with(second.clone()),
    ));

    let mut repair = RepairLoop::new(llm(), validator, CountingFetcher::default(), settings(3));
    repair.run(&ctx, SOURCE).await.unwrap();

    let events = first.events();
    assert_eq!(events, second.events());
    assert_eq!(events.first(), Some(&RunEvent::RunStarted { max_attempts: 3 }));
    assert!(matches!(
        events.last(),
        Some(RunEvent::RunFinished {
            status: RunStatus::Done,
            attempts: 2,
            ..
        })
    ));
}
