//! Artifact store - candidate files and a human-readable run log
//!
//! Writes into the output directory:
//! - `<ts>_attempt_<n>.yml` for every normalized candidate
//! - `<ts>_final.yml` for the selected result
//! - `<ts>_quality_<n>.md` for every quality verdict
//! - `activity.md`, appended to by every run
//!
//! `<ts>` is the run-start timestamp. Every write is fail-open.

use chrono::Utc;
use ciport_core::fail_open::fail_open;
use ciport_core::{Attempt, RunContext, Result, Verdict};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::repair_loop::RunReport;

/// Maximum characters of validator output quoted in the activity log
const ACTIVITY_LOG_PREVIEW_CHARS: usize = 1500;

/// Writes run artifacts under one directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    slug: String,
}

impl ArtifactStore {
    pub fn new(dir: PathBuf, ctx: &RunContext) -> Self {
        Self {
            dir,
            slug: ctx.timestamp_slug(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn attempt_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}_attempt_{}.yml", self.slug, index))
    }

    pub fn final_path(&self) -> PathBuf {
        self.dir.join(format!("{}_final.yml", self.slug))
    }

    pub fn quality_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}_quality_{}.md", self.slug, index))
    }

    pub fn activity_path(&self) -> PathBuf {
        self.dir.join("activity.md")
    }

    /// Persist a normalized candidate; `None` if the write failed
    pub async fn write_attempt(&self, index: usize, candidate: &str) -> Option<PathBuf> {
        let path = self.attempt_path(index);
        fail_open("artifacts::write_attempt", || self.write_file(&path, candidate)).await?;
        Some(path)
    }

    /// Persist the selected result
    pub async fn write_final(&self, candidate: &str) -> Option<PathBuf> {
        let path = self.final_path();
        fail_open("artifacts::write_final", || self.write_file(&path, candidate)).await?;
        Some(path)
    }

    /// Persist a quality verdict as Markdown
    pub async fn write_quality_report(&self, index: usize, verdict: &Verdict) -> Option<PathBuf> {
        let path = self.quality_path(index);
        let content = format!(
            "# Quality check: attempt {}\n\n**Verdict**: {}\n\n{}\n",
            index,
            if verdict.passed { "PASS" } else { "FAIL" },
            verdict.rationale
        );
        fail_open("artifacts::write_quality_report", || {
            self.write_file(&path, &content)
        })
        .await?;
        Some(path)
    }

    pub async fn log_run_start(&self, ctx: &RunContext, source: &str, max_attempts: usize) {
        let content = format!(
            "# ciport run {}\n\n**Source**: {}\n**Started**: {}\n**Max Attempts**: {}\n\n---\n\n",
            ctx.run_id,
            source,
            ctx.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            max_attempts
        );
        self.append_activity("artifacts::log_run_start", &content)
            .await;
    }

    pub async fn log_attempt(&self, attempt: &Attempt) {
        let mut content = format!(
            "### Attempt {} ({} strategy)\n**Time**: {}\n**Validation**: {}\n",
            attempt.index,
            attempt.strategy,
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
            if attempt.passed() {
                "PASS".to_string()
            } else {
                format!("FAIL ({} diagnostics)", attempt.diagnostic_count)
            }
        );

        if let Some(path) = &attempt.output_path {
            content.push_str(&format!("**Candidate**: {}\n", path.display()));
        }
        content.push('\n');

        if !attempt.passed() && !attempt.outcome.stdout.trim().is_empty() {
            let preview = preview(&attempt.outcome.stdout);
            content.push_str("```\n");
            content.push_str(preview.trim_end());
            content.push_str("\n```\n\n");
        }

        self.append_activity("artifacts::log_attempt", &content)
            .await;
    }

    pub async fn log_verdict(&self, index: usize, verdict: &Verdict) {
        let content = format!(
            "**Quality (attempt {})**: {}\n\n",
            index,
            if verdict.passed { "PASS" } else { "FAIL" }
        );
        self.append_activity("artifacts::log_verdict", &content)
            .await;
    }

    pub async fn log_run_finished(&self, report: &RunReport) {
        let mut content = format!(
            "## Run Summary\n\n\
            **Completed**: {}\n\
            **Status**: {}\n\
            **Attempts**: {}\n\
            **Validation Passed**: {}\n\
            **Cost**: ${:.4}\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
            report.status,
            report.attempts.len(),
            if report.validation_passed { "yes" } else { "no" },
            report.total_cost_usd
        );

        if let Some(path) = &report.final_path {
            content.push_str(&format!("**Final**: {}\n", path.display()));
        }

        content.push_str("\n| attempt | diagnostics |\n|---|---|\n");
        for summary in &report.ranking {
            content.push_str(&format!(
                "| {} | {} |\n",
                summary.index, summary.diagnostic_count
            ));
        }
        content.push_str("\n---\n\n");

        self.append_activity("artifacts::log_run_finished", &content)
            .await;
    }

    async fn append_activity(&self, operation: &str, content: &str) {
        fail_open(operation, || self.append_internal(content)).await;
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    async fn append_internal(&self, content: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.activity_path())
            .await?;

        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > ACTIVITY_LOG_PREVIEW_CHARS {
        let truncated: String = text.chars().take(ACTIVITY_LOG_PREVIEW_CHARS).collect();
        format!("{truncated}...")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ciport_core::{Diagnostic, Strategy, ValidationOutcome};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_artifact_names_share_run_timestamp() {
        let temp = TempDir::new().unwrap();
        let ctx = RunContext::tracing();
        let store = ArtifactStore::new(temp.path().join("runs"), &ctx);

        let attempt = store.write_attempt(2, "jobs: {}\n").await.unwrap();
        let final_path = store.write_final("jobs: {}\n").await.unwrap();

        let slug = ctx.timestamp_slug();
        assert_eq!(
            attempt.file_name().unwrap().to_str().unwrap(),
            format!("{}_attempt_2.yml", slug)
        );
        assert_eq!(
            final_path.file_name().unwrap().to_str().unwrap(),
            format!("{}_final.yml", slug)
        );
        assert_eq!(tokio::fs::read_to_string(&final_path).await.unwrap(), "jobs: {}\n");
    }

    #[tokio::test]
    async fn test_activity_log_appends() {
        let temp = TempDir::new().unwrap();
        let ctx = RunContext::tracing();
        let store = ArtifactStore::new(temp.path().to_path_buf(), &ctx);

        store.log_run_start(&ctx, ".gitlab-ci.yml", 3).await;
        store
            .log_attempt(&Attempt {
                index: 1,
                strategy: Strategy::Fresh,
                candidate: "jobs: {}".into(),
                outcome: ValidationOutcome::fail(".github/workflows/candidate.yml:1:1: boom"),
                diagnostics: vec![Diagnostic {
                    line: 1,
                    column: 1,
                    message: "boom".into(),
                    reference_url: None,
                }],
                diagnostic_count: 1,
                output_path: None,
            })
            .await;
        store
            .log_verdict(
                1,
                &Verdict {
                    passed: true,
                    rationale: "ok".into(),
                },
            )
            .await;

        let content = tokio::fs::read_to_string(store.activity_path()).await.unwrap();
        assert!(content.contains(&format!("# ciport run {}", ctx.run_id)));
        assert!(content.contains("**Max Attempts**: 3"));
        assert!(content.contains("FAIL (1 diagnostics)"));
        assert!(content.contains("candidate.yml:1:1: boom"));
        assert!(content.contains("**Quality (attempt 1)**: PASS"));
    }

    #[tokio::test]
    async fn test_unwritable_dir_is_fail_open() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("file");
        tokio::fs::write(&blocker, "not a dir").await.unwrap();

        let store = ArtifactStore::new(blocker.join("runs"), &RunContext::tracing());
        assert!(store.write_attempt(1, "x").await.is_none());
        store.log_verdict(1, &Verdict { passed: false, rationale: String::new() }).await;
    }

    #[test]
    fn test_preview_truncates() {
        let long = "x".repeat(ACTIVITY_LOG_PREVIEW_CHARS + 10);
        assert!(preview(&long).ends_with("..."));
        assert_eq!(preview("short"), "short");
    }
}
