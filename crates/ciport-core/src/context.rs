//! Run-scoped context and structured event sink
//!
//! Every component of the repair loop receives a [`RunContext`] explicitly.
//! Components report what they did by emitting [`RunEvent`]s into the
//! context's sink instead of touching process-wide state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::{RunStatus, Strategy};

/// Structured events emitted during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        max_attempts: usize,
    },
    PlanReady {
        chars: usize,
        cost_usd: f64,
    },
    AttemptStarted {
        index: usize,
        strategy: Strategy,
    },
    CandidateValidated {
        index: usize,
        passed: bool,
        diagnostic_count: usize,
    },
    DocsResolved {
        index: usize,
        fetched: usize,
        cached: usize,
    },
    GuidanceReady {
        index: usize,
        chars: usize,
    },
    QualityJudged {
        index: usize,
        passed: bool,
    },
    StrategySwitched {
        from: Strategy,
        to: Strategy,
    },
    RunFinished {
        status: RunStatus,
        attempts: usize,
        total_cost_usd: f64,
    },
}

/// Destination for run events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &RunEvent);
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &RunEvent) {
        match event {
            RunEvent::RunStarted { max_attempts } => {
                info!("Run started (max {} attempts)", max_attempts)
            }
            RunEvent::PlanReady { chars, cost_usd } => {
                info!("Plan ready ({} chars, ${:.4})", chars, cost_usd)
            }
            RunEvent::AttemptStarted { index, strategy } => {
                info!("=== Attempt {} ({} strategy) ===", index, strategy)
            }
            RunEvent::CandidateValidated {
                index,
                passed,
                diagnostic_count,
            } => {
                if *passed {
                    info!("Attempt {} passed validation", index);
                } else {
                    warn!(
                        "Attempt {} failed validation ({} diagnostics)",
                        index, diagnostic_count
                    );
                }
            }
            RunEvent::DocsResolved {
                index,
                fetched,
                cached,
            } => debug!(
                "Attempt {} docs: {} fetched, {} from cache",
                index, fetched, cached
            ),
            RunEvent::GuidanceReady { index, chars } => {
                debug!("Attempt {} repair guidance ready ({} chars)", index, chars)
            }
            RunEvent::QualityJudged { index, passed } => info!(
                "Attempt {} quality verdict: {}",
                index,
                if *passed { "PASS" } else { "FAIL" }
            ),
            RunEvent::StrategySwitched { from, to } => {
                info!("Switching strategy {} -> {}", from, to)
            }
            RunEvent::RunFinished {
                status,
                attempts,
                total_cost_usd,
            } => info!(
                "Run finished: {} after {} attempts (${:.4})",
                status, attempts, total_cost_usd
            ),
        }
    }
}

/// Collects events in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<RunEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events emitted so far
    pub fn events(&self) -> Vec<RunEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &RunEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Sends every event to several sinks
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &RunEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

/// Context owned by one run and passed to every component
#[derive(Clone)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    sink: Arc<dyn EventSink>,
}

impl RunContext {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string()[..8].to_string(),
            started_at: Utc::now(),
            sink,
        }
    }

    /// Context that only logs through `tracing`
    pub fn tracing() -> Self {
        Self::new(Arc::new(TracingSink))
    }

    pub fn emit(&self, event: RunEvent) {
        self.sink.emit(&event);
    }

    /// Run-start timestamp used to key artifact filenames
    pub fn timestamp_slug(&self) -> String {
        self.started_at.format("%Y%m%d_%H%M%S").to_string()
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("started_at", &self.started_at)
            .finish()
    }
}
