//! LLM collaborator trait and the Anthropic client
//!
//! Every call is a single stateless prompt. No conversation history is kept
//! between calls; whatever context a step needs is rendered into its prompt.

use crate::auth;
use crate::circuit_breaker::CircuitBreaker;
use crate::openrouter::OpenRouterClient;
use crate::types::{AnthropicRequest, AnthropicResponse, ChatMessage, Completion, Model};
use async_trait::async_trait;
use ciport_core::config::{ModelConfig, Provider};
use ciport_core::{CiportError, Result};
use std::time::Duration;
use tracing::instrument;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: usize = 16000;

/// `complete(prompt) -> (text, cost)`
///
/// Implementations may retry transient transport failures (rate limits,
/// 5xx) internally. Any error they return is final.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<Completion>;

    /// Human-readable provider/model label for logs
    fn describe(&self) -> String;
}

#[async_trait]
impl<T: LlmClient + ?Sized> LlmClient for Box<T> {
    async fn complete(&self, prompt: &str) -> Result<Completion> {
        (**self).complete(prompt).await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

#[async_trait]
impl<T: LlmClient + ?Sized> LlmClient for std::sync::Arc<T> {
    async fn complete(&self, prompt: &str) -> Result<Completion> {
        (**self).complete(prompt).await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Rate limit / server error retry configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_secs(30),
            // 5 minutes max
            max_backoff: Duration::from_secs(300),
        }
    }
}

/// Send a request, retrying 429 and 5xx responses with exponential backoff
///
/// `build` is called once per attempt because a sent request cannot be reused.
pub(crate) async fn send_with_retry<F>(
    provider: &str,
    policy: &RetryPolicy,
    breaker: &CircuitBreaker,
    build: F,
) -> Result<reqwest::Response>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    if !breaker.can_execute() {
        return Err(CiportError::ApiLimit(format!(
            "Circuit breaker is OPEN for {} after repeated failures. Retry in {} seconds.",
            provider,
            breaker.time_until_retry().as_secs()
        )));
    }

    let mut retries = 0;
    let mut backoff = policy.initial_backoff;

    loop {
        tracing::debug!("Sending request to {} (attempt {})", provider, retries + 1);

        let response = build().send().await.map_err(|e| {
            breaker.record_failure();
            CiportError::Api(format!("Failed to send request to {}: {}", provider, e))
        })?;

        let status = response.status();

        if status.as_u16() == 429 {
            retries += 1;
            if retries > policy.max_retries {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown".to_string());
                breaker.record_failure();
                return Err(CiportError::ApiLimit(format!(
                    "{} rate limit exceeded after {} retries. Last error: {}",
                    provider, policy.max_retries, error_text
                )));
            }

            let wait = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(backoff);

            tracing::warn!(
                "Rate limited by {} (429). Waiting {}s before retry {}/{}",
                provider,
                wait.as_secs(),
                retries,
                policy.max_retries
            );
            tokio::time::sleep(wait).await;
            backoff = (backoff * 2).min(policy.max_backoff);
            continue;
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown".to_string());

            if status.is_server_error() && retries < policy.max_retries {
                retries += 1;
                tracing::warn!(
                    "{} server error ({}). Waiting {}s before retry {}/{}",
                    provider,
                    status,
                    backoff.as_secs(),
                    retries,
                    policy.max_retries
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(policy.max_backoff);
                continue;
            }

            breaker.record_failure();
            tracing::error!(
                "{} request failed, circuit breaker count {}",
                provider,
                breaker.failure_count()
            );
            return Err(CiportError::Api(format!(
                "{} API error {}: {}",
                provider, status, error_text
            )));
        }

        breaker.record_success();
        return Ok(response);
    }
}

/// Anthropic Messages API client
#[derive(Debug)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    model: Model,
    max_tokens: usize,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
}

impl AnthropicClient {
    pub fn new(model: Model, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            model,
            max_tokens: DEFAULT_MAX_TOKENS,
            retry: RetryPolicy::default(),
            breaker: CircuitBreaker::default(),
        }
    }

    /// Set max tokens for responses
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> Model {
        self.model
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    #[instrument(skip(self, prompt), fields(model = %self.model, prompt_chars = prompt.len()))]
    async fn complete(&self, prompt: &str) -> Result<Completion> {
        let request = AnthropicRequest {
            model: self.model.api_name().to_string(),
            max_tokens: self.max_tokens,
            messages: vec![ChatMessage::user(prompt)],
        };

        let response = send_with_retry("Anthropic", &self.retry, &self.breaker, || {
            self.http
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request)
        })
        .await?;

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| CiportError::Api(format!("Failed to parse response: {}", e)))?;

        let text: String = parsed
            .content
            .iter()
            .filter(|block| block.content_type == "text")
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(CiportError::Api("No text content in response".to_string()));
        }

        let cost_usd = parsed
            .usage
            .as_ref()
            .map(|usage| self.model.cost(usage))
            .unwrap_or(0.0);

        tracing::debug!("Completion: {} chars, ${:.4}", text.len(), cost_usd);

        Ok(Completion {
            text,
            cost_usd,
            usage: parsed.usage,
        })
    }

    fn describe(&self) -> String {
        format!("anthropic/{}", self.model)
    }
}

/// Build the configured provider's client
pub fn client_from_config(config: &ModelConfig) -> Result<Box<dyn LlmClient>> {
    let api_key = auth::resolve_api_key(config)?;

    match config.provider {
        Provider::Anthropic => {
            let model: Model = config.default.parse().map_err(CiportError::Config)?;
            Ok(Box::new(
                AnthropicClient::new(model, api_key).with_max_tokens(config.max_tokens),
            ))
        }
        Provider::OpenRouter => Ok(Box::new(
            OpenRouterClient::new(config.default.clone(), api_key)
                .with_max_tokens(config.max_tokens),
        )),
    }
}
