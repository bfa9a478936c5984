//! Pure state machine for the repair loop
//!
//! No I/O, no async. The loop performs the work of the current phase,
//! reports what happened as a [`LoopEvent`], and asks [`transition`] where
//! to go next and which bookkeeping [`LoopAction`]s to apply on the way.
//!
//! ```text
//! Plan -> Generate -> Normalize -> Validate -+-> Done
//!            ^                               +-> QualityCheck -> Done
//!            |                               |        |
//!            +------------ Diagnose <--------+        |
//!            +----------------------------------------+
//! ```
//!
//! Invalid transitions are reported as errors; this module never panics.

use ciport_core::{CiportError, Result};

/// Loop phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    /// Produce the migration plan
    Plan,
    /// Produce a raw candidate
    Generate,
    /// Deterministic cleanup
    Normalize,
    /// Run the external validator
    Validate,
    /// Resolve documentation and build repair guidance after a failure
    Diagnose,
    /// Judge semantic equivalence of a valid candidate
    QualityCheck,
    /// A candidate passed validation (terminal)
    Done,
    /// Attempts ran out (terminal)
    Exhausted,
}

impl LoopPhase {
    /// First phase of a run. A zero budget never plans or generates.
    pub fn start(max_attempts: usize) -> Self {
        if max_attempts == 0 {
            Self::Exhausted
        } else {
            Self::Plan
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Exhausted)
    }
}

/// Outcome of the work done in a phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEvent {
    PlanReady,
    CandidateGenerated,
    CandidateNormalized,
    ValidationPassed,
    ValidationFailed,
    GuidanceReady,
    QualityPassed,
    QualityFailed,
}

/// Bookkeeping applied by the loop when taking a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Use the debug strategy from now on (sticky)
    SwitchToDebug,
    /// Use the quality verdict as repair guidance for the next candidate
    FeedVerdictBack,
}

/// Run-level switches that shape the graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopPolicy {
    /// Judge valid candidates before accepting them
    pub quality_gate: bool,
    /// Retry when the judge rejects a valid candidate
    pub thorough: bool,
}

/// Result of a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: LoopPhase,
    pub actions: Vec<LoopAction>,
}

impl Transition {
    fn to(next: LoopPhase) -> Self {
        Self {
            next,
            actions: Vec::new(),
        }
    }

    fn with(mut self, action: LoopAction) -> Self {
        self.actions.push(action);
        self
    }
}

/// Pure transition function
///
/// `attempts_remaining` is the number of generate cycles still allowed,
/// counted after the current attempt.
pub fn transition(
    phase: LoopPhase,
    event: LoopEvent,
    policy: LoopPolicy,
    attempts_remaining: usize,
) -> Result<Transition> {
    use LoopEvent as E;
    use LoopPhase as P;

    let next = match (phase, event) {
        (P::Plan, E::PlanReady) => Transition::to(P::Generate),
        (P::Generate, E::CandidateGenerated) => Transition::to(P::Normalize),
        (P::Normalize, E::CandidateNormalized) => Transition::to(P::Validate),

        (P::Validate, E::ValidationPassed) => {
            if policy.quality_gate || policy.thorough {
                Transition::to(P::QualityCheck)
            } else {
                Transition::to(P::Done)
            }
        }

        // Guidance is only worth building if another candidate will use it
        (P::Validate, E::ValidationFailed) => {
            if attempts_remaining > 0 {
                Transition::to(P::Diagnose).with(LoopAction::SwitchToDebug)
            } else {
                Transition::to(P::Exhausted)
            }
        }

        (P::Diagnose, E::GuidanceReady) => Transition::to(P::Generate),

        (P::QualityCheck, E::QualityPassed) => Transition::to(P::Done),

        (P::QualityCheck, E::QualityFailed) => {
            if policy.thorough && attempts_remaining > 0 {
                Transition::to(P::Generate)
                    .with(LoopAction::FeedVerdictBack)
                    .with(LoopAction::SwitchToDebug)
            } else {
                // Valid but not approved: best available
                Transition::to(P::Done)
            }
        }

        (phase, event) => {
            return Err(CiportError::Orchestrator(format!(
                "Invalid loop transition: {:?} cannot handle {:?}",
                phase, event
            )))
        }
    };

    Ok(next)
}
