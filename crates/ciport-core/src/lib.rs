//! # ciport-core
//!
//! Core types for ciport, a CI pipeline migration tool.
//!
//! ciport converts a pipeline definition from one CI dialect into another by
//! running a bounded generate-validate-repair loop. This crate holds what every
//! stage of that loop shares:
//!
//! - The unified error type
//! - Repository-level configuration
//! - The run data model (attempts, diagnostics, cache entries, verdicts)
//! - The run-scoped context and its structured event sink

pub mod config;
mod context;
mod error;
pub mod fail_open;
mod types;

pub use config::CiportConfig;
pub use context::{EventSink, FanoutSink, MemorySink, RunContext, RunEvent, TracingSink};
pub use error::{CiportError, Result};
pub use types::*;
