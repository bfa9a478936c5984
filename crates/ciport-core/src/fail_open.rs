//! Fail-open utilities for side effects
//!
//! Persisting attempt files, quality reports, the activity log and the doc
//! cache are side effects of a run. A failure there must not change the
//! loop's decisions, so these operations go through [`fail_open`].
//!
//! DO NOT use fail-open for:
//! - LLM calls (generation, analysis, summaries, judgments)
//! - Validator invocations
//! - Plan generation

use std::future::Future;
use tracing::warn;

use crate::Result;

/// Execute a side-effect operation, logging and swallowing any error
///
/// Returns `None` if the operation failed.
///
/// ```no_run
/// use ciport_core::fail_open::fail_open;
/// use ciport_core::Result;
///
/// async fn write_report() -> Result<()> {
///     Ok(())
/// }
///
/// async fn example() {
///     let written = fail_open("quality_report", || write_report()).await;
///     // written is None if write_report() failed
/// }
/// ```
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}
