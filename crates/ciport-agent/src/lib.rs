//! # ciport-agent
//!
//! LLM collaborator for the ciport repair loop.
//!
//! Every model-backed step (planning, generation, documentation summaries,
//! error analysis, quality judgments) goes through the [`LlmClient`] trait:
//! one prompt in, one [`Completion`] (text plus monetary cost) out. Errors are
//! returned to the caller as-is; the repair loop never retries a failed call.
//!
//! Two providers are supported:
//! - Anthropic Messages API, cost estimated from the model's price table
//! - OpenRouter chat completions, cost as reported by the provider (zero when absent)

mod auth;
mod circuit_breaker;
mod client;
mod mock;
mod openrouter;
mod types;

pub use auth::resolve_api_key;
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use client::{client_from_config, AnthropicClient, LlmClient, RetryPolicy};
pub use mock::MockLlmClient;
pub use openrouter::OpenRouterClient;
pub use types::*;
