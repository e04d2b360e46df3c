use crate::error::ApiError;
use crate::llm::{Completion, DecisionProvider, DecisionRequest};
use async_trait::async_trait;
use core_types::{ProviderKind, TokenUsage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const DEFAULT_RESPONSE: &str =
    r#"{"action": "HOLD", "confidence": 0.5, "reasoning": "scripted agent holds by default"}"#;

/// An offline provider that replays canned responses in a loop.
///
/// Used for dry runs and demos where no API key is available. An empty script
/// answers HOLD every cycle.
pub struct ScriptedProvider {
    model_id: String,
    script: Vec<String>,
    cursor: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(model_id: impl Into<String>, script: Vec<String>) -> Self {
        Self {
            model_id: model_id.into(),
            script,
            cursor: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Simulates provider latency before every response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn next_response(&self) -> String {
        if self.script.is_empty() {
            return DEFAULT_RESPONSE.to_string();
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.script.len();
        self.script[index].clone()
    }
}

#[async_trait]
impl DecisionProvider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Scripted
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn decide(&self, request: &DecisionRequest) -> Result<Completion, ApiError> {
        if let Some(delay) = self.delay {
            if delay >= request.timeout {
                tokio::time::sleep(request.timeout).await;
                return Err(ApiError::Timeout(format!(
                    "scripted delay exceeded {}ms",
                    request.timeout.as_millis()
                )));
            }
            tokio::time::sleep(delay).await;
        }
        let text = self.next_response();
        let completion_tokens = u32::try_from(text.len() / 4).unwrap_or(u32::MAX);
        Ok(Completion {
            text,
            token_usage: TokenUsage {
                prompt_tokens: 0,
                completion_tokens,
                total_tokens: completion_tokens,
            },
        })
    }
}
