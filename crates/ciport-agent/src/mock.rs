//! Scripted LLM client for tests
//!
//! Replies are keyed by a substring of the prompt. The first rule whose needle
//! appears in the prompt answers; a rule with several replies serves them in
//! order and then keeps repeating the last one.

use crate::client::LlmClient;
use crate::types::Completion;
use async_trait::async_trait;
use ciport_core::{CiportError, Result};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
enum MockReply {
    Text(String),
    Fail(String),
}

/// Mock LLM client for testing
#[derive(Debug, Default)]
pub struct MockLlmClient {
    rules: Vec<(String, Vec<MockReply>)>,
    served: Mutex<HashMap<usize, usize>>,
    calls: Mutex<Vec<String>>,
    cost_per_call: f64,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer prompts containing `needle` with `text`.
    ///
    /// Repeated calls with the same needle queue further replies.
    pub fn with_response(self, needle: &str, text: impl Into<String>) -> Self {
        self.push(needle, MockReply::Text(text.into()))
    }

    /// Fail prompts containing `needle`
    pub fn with_failure(self, needle: &str, message: impl Into<String>) -> Self {
        self.push(needle, MockReply::Fail(message.into()))
    }

    /// Cost reported for every completion
    pub fn with_cost(mut self, cost_per_call: f64) -> Self {
        self.cost_per_call = cost_per_call;
        self
    }

    fn push(mut self, needle: &str, reply: MockReply) -> Self {
        match self.rules.iter_mut().find(|(n, _)| n == needle) {
            Some((_, replies)) => replies.push(reply),
            None => self.rules.push((needle.to_string(), vec![reply])),
        }
        self
    }

    /// Every prompt received, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of prompts received that contain `needle`
    pub fn call_count(&self, needle: &str) -> usize {
        self.calls().iter().filter(|p| p.contains(needle)).count()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, prompt: &str) -> Result<Completion> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(prompt.to_string());
        }

        let (rule_index, replies) = self
            .rules
            .iter()
            .enumerate()
            .find(|(_, (needle, _))| prompt.contains(needle.as_str()))
            .map(|(i, (_, replies))| (i, replies))
            .ok_or_else(|| {
                let head: String = prompt.chars().take(80).collect();
                CiportError::Api(format!("No mock response for prompt: {}", head))
            })?;

        let served = {
            let mut served = self
                .served
                .lock()
                .map_err(|_| CiportError::Other("mock state poisoned".into()))?;
            let count = served.entry(rule_index).or_insert(0);
            let current = *count;
            *count += 1;
            current
        };

        match &replies[served.min(replies.len() - 1)] {
            MockReply::Text(text) => Ok(Completion::new(text.clone(), self.cost_per_call)),
            MockReply::Fail(message) => Err(CiportError::Api(message.clone())),
        }
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sequenced_replies_repeat_last() {
        let mock = MockLlmClient::new()
            .with_response("GEN", "first")
            .with_response("GEN", "second");

        assert_eq!(mock.complete("GEN 1").await.unwrap().text, "first");
        assert_eq!(mock.complete("GEN 2").await.unwrap().text, "second");
        assert_eq!(mock.complete("GEN 3").await.unwrap().text, "second");
        assert_eq!(mock.call_count("GEN"), 3);
    }

    #[tokio::test]
    async fn test_failure_and_unmatched() {
        let mock = MockLlmClient::new()
            .with_failure("PLAN", "provider down")
            .with_cost(0.5);

        assert!(mock.complete("PLAN this").await.is_err());
        assert!(mock.complete("something else").await.is_err());
        assert_eq!(mock.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_cost_reported() {
        let mock = MockLlmClient::new().with_response("x", "y").with_cost(0.25);
        let completion = mock.complete("x").await.unwrap();
        assert_eq!(completion.cost_usd, 0.25);
    }
}
