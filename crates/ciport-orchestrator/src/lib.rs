//! # ciport-orchestrator
//!
//! The generate-validate-repair loop.
//!
//! [`RepairLoop`] composes every stage of a conversion:
//!
//! 1. [`generator`] - one-time plan, then candidates from the fresh or debug strategy
//! 2. [`normalizer`] - deterministic cleanup of each candidate
//! 3. validation through a [`ciport_validation::ArtifactValidator`]
//! 4. [`docs`] - cached documentation summaries for failing diagnostics
//! 5. [`analyst`] - consolidated repair guidance for the next attempt
//! 6. [`quality`] - optional semantic-equivalence gate
//!
//! Control flow is the pure state machine in [`phase`]; the loop only
//! performs the work each phase calls for.

pub mod analyst;
pub mod artifacts;
pub mod docs;
pub mod generator;
pub mod normalizer;
pub mod phase;
pub mod prompt;
pub mod quality;
pub mod repair_loop;

pub use artifacts::ArtifactStore;
pub use docs::{DocCache, DocFetcher, DocResolution, HttpDocFetcher};
pub use normalizer::normalize;
pub use phase::{LoopAction, LoopEvent, LoopPhase, LoopPolicy, Transition};
pub use quality::parse_verdict;
pub use repair_loop::{LoopSettings, RepairLoop, RunReport};
