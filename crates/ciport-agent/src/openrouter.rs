//! OpenRouter (OpenAI-compatible chat completions) client
//!
//! Cost is whatever the provider reports in `usage.cost`. Nothing is
//! estimated: a missing cost is recorded as zero.

use crate::circuit_breaker::CircuitBreaker;
use crate::client::{send_with_retry, LlmClient, RetryPolicy};
use crate::types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Completion, UsageAccounting,
};
use async_trait::async_trait;
use ciport_core::{CiportError, Result};
use tracing::instrument;

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

#[derive(Debug)]
pub struct OpenRouterClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: usize,
    endpoint: String,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
}

impl OpenRouterClient {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: 16000,
            endpoint: OPENROUTER_URL.to_string(),
            retry: RetryPolicy::default(),
            breaker: CircuitBreaker::default(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Point at another OpenAI-compatible endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    #[instrument(skip(self, prompt), fields(model = %self.model, prompt_chars = prompt.len()))]
    async fn complete(&self, prompt: &str) -> Result<Completion> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: self.max_tokens,
            usage: UsageAccounting { include: true },
        };

        let response = send_with_retry("OpenRouter", &self.retry, &self.breaker, || {
            self.http
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&request)
        })
        .await?;

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| CiportError::Api(format!("Failed to parse response: {}", e)))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| CiportError::Api("No content in response".to_string()))?;

        let cost_usd = parsed
            .usage
            .as_ref()
            .and_then(|usage| usage.cost)
            .unwrap_or(0.0);

        Ok(Completion {
            text,
            cost_usd,
            usage: parsed.usage.map(|usage| usage.to_usage()),
        })
    }

    fn describe(&self) -> String {
        format!("openrouter/{}", self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let client = OpenRouterClient::new("anthropic/claude-sonnet-4.5", "key")
            .with_max_tokens(4000)
            .with_endpoint("http://localhost:8080/v1/chat/completions");
        assert_eq!(client.max_tokens, 4000);
        assert_eq!(client.endpoint, "http://localhost:8080/v1/chat/completions");
        assert_eq!(client.describe(), "openrouter/anthropic/claude-sonnet-4.5");
    }

    #[test]
    fn test_request_includes_usage_accounting() {
        let request = ChatCompletionRequest {
            model: "m".into(),
            messages: vec![ChatMessage::user("hi")],
            max_tokens: 10,
            usage: UsageAccounting { include: true },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["usage"]["include"], true);
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
