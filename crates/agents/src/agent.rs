use crate::error::AgentError;
use crate::resolver::{AgentDecision, DecisionResolver};
use api_client::{DecisionProvider, DecisionRequest};
use core_types::{AgentSpec, TokenUsage};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why an agent's cycle ended in a synthetic WAIT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Timeout,
    ProviderError,
    ParseError,
    ValidationError,
    AgentUnavailable,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::Timeout => "timeout",
            FailureClass::ProviderError => "provider_error",
            FailureClass::ParseError => "parse_error",
            FailureClass::ValidationError => "validation_error",
            FailureClass::AgentUnavailable => "agent_unavailable",
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one agent produced for one cycle. Never an error: failures are
/// already folded into a WAIT decision with `failure` set.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub decision: AgentDecision,
    pub failure: Option<FailureClass>,
    pub token_usage: Option<TokenUsage>,
    pub latency: Duration,
}

impl AgentOutcome {
    /// A WAIT whose reasoning reads `<failure class>: <detail>`.
    pub fn failed(class: FailureClass, detail: impl fmt::Display, latency: Duration) -> Self {
        Self {
            decision: AgentDecision::wait(format!("{}: {}", class, detail)),
            failure: Some(class),
            token_usage: None,
            latency,
        }
    }
}

/// A competitor: its spec, the provider that answers for it and its decision timeout.
#[derive(Clone)]
pub struct Agent {
    spec: AgentSpec,
    provider: Arc<dyn DecisionProvider>,
    resolver: DecisionResolver,
    timeout: Duration,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.spec.name)
            .field("provider", &self.spec.provider)
            .field("model_id", &self.spec.model_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Agent {
    pub fn new(
        spec: AgentSpec,
        provider: Arc<dyn DecisionProvider>,
        symbols: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            spec,
            provider,
            resolver: DecisionResolver::new(symbols),
            timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &AgentSpec {
        &self.spec
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn probe(&self) -> Result<(), AgentError> {
        if self.provider.is_available().await {
            Ok(())
        } else {
            Err(AgentError::Unavailable {
                agent: self.spec.name.clone(),
                reason: format!("{} did not answer the availability probe", self.spec.provider),
            })
        }
    }

    /// Asks the provider for a decision, bounded by the agent's timeout.
    pub async fn decide(&self, system_prompt: &str, market_context: &str) -> AgentOutcome {
        let request = DecisionRequest {
            system_prompt: system_prompt.to_string(),
            market_context: market_context.to_string(),
            timeout: self.timeout,
        };
        let started = Instant::now();

        let result = tokio::time::timeout(self.timeout, self.provider.decide(&request)).await;
        let latency = started.elapsed();

        let completion = match result {
            Err(_) => {
                tracing::warn!(agent = %self.spec.name, timeout_ms = self.timeout.as_millis() as u64, "Agent timed out");
                return AgentOutcome::failed(
                    FailureClass::Timeout,
                    format!("no response within {}ms", self.timeout.as_millis()),
                    latency,
                );
            }
            Ok(Err(e)) => {
                tracing::warn!(agent = %self.spec.name, class = e.class(), error = %e, "Provider call failed");
                let class = if e.class() == "timeout" {
                    FailureClass::Timeout
                } else {
                    FailureClass::ProviderError
                };
                return AgentOutcome::failed(class, e, latency);
            }
            Ok(Ok(completion)) => completion,
        };

        match self.resolver.resolve(&completion.text) {
            Ok(decision) => AgentOutcome {
                decision,
                failure: None,
                token_usage: Some(completion.token_usage),
                latency,
            },
            Err(e) => {
                let class = match e {
                    AgentError::Validation(_) => FailureClass::ValidationError,
                    _ => FailureClass::ParseError,
                };
                tracing::warn!(agent = %self.spec.name, class = class.as_str(), error = %e, "Unusable decision");
                let mut outcome = AgentOutcome::failed(
                    class,
                    format!("{} | raw: {}", e, completion.text.trim()),
                    latency,
                );
                outcome.token_usage = Some(completion.token_usage);
                outcome
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::TradeAction;
    use api_client::{ApiError, Completion, ScriptedProvider};
    use async_trait::async_trait;
    use core_types::ProviderKind;

    struct FailingProvider(ApiError);

    #[async_trait]
    impl DecisionProvider for FailingProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::OpenAi
        }
        fn model_id(&self) -> &str {
            "failing"
        }
        async fn is_available(&self) -> bool {
            false
        }
        async fn decide(&self, _request: &DecisionRequest) -> Result<Completion, ApiError> {
            Err(self.0.clone())
        }
    }

    struct HangingProvider;

    #[async_trait]
    impl DecisionProvider for HangingProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::OpenAi
        }
        fn model_id(&self) -> &str {
            "hanging"
        }
        async fn is_available(&self) -> bool {
            true
        }
        async fn decide(&self, _request: &DecisionRequest) -> Result<Completion, ApiError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(ApiError::Network("unreachable".to_string()))
        }
    }

    fn agent(provider: Arc<dyn DecisionProvider>, timeout: Duration) -> Agent {
        Agent::new(
            AgentSpec::new("alpha", provider.kind(), provider.model_id()),
            provider,
            vec!["BTC/USD".to_string()],
            timeout,
        )
    }

    #[tokio::test]
    async fn test_valid_response_becomes_decision() {
        let provider = Arc::new(ScriptedProvider::new(
            "scripted",
            vec![r#"{"action":"BUY","symbol":"BTC/USD","quantity":1,"confidence":0.9,"reasoning":"go"}"#.to_string()],
        ));
        let outcome = agent(provider, Duration::from_secs(1)).decide("sys", "ctx").await;
        assert!(outcome.failure.is_none());
        assert!(matches!(outcome.decision.action, TradeAction::Buy { .. }));
        assert!(outcome.token_usage.is_some());
    }

    #[tokio::test]
    async fn test_timeout_becomes_wait() {
        let outcome = agent(Arc::new(HangingProvider), Duration::from_millis(20))
            .decide("sys", "ctx")
            .await;
        assert_eq!(outcome.failure, Some(FailureClass::Timeout));
        assert_eq!(outcome.decision.action, TradeAction::Wait);
        assert!(outcome.decision.reasoning.starts_with("timeout: "));
    }

    #[tokio::test]
    async fn test_provider_error_becomes_wait() {
        let provider = Arc::new(FailingProvider(ApiError::RateLimited("slow down".to_string())));
        let outcome = agent(provider, Duration::from_secs(1)).decide("sys", "ctx").await;
        assert_eq!(outcome.failure, Some(FailureClass::ProviderError));
        assert!(outcome.decision.reasoning.starts_with("provider_error: "));
    }

    #[tokio::test]
    async fn test_garbage_keeps_raw_text() {
        let provider = Arc::new(ScriptedProvider::new(
            "scripted",
            vec!["I think we should buy everything".to_string()],
        ));
        let outcome = agent(provider, Duration::from_secs(1)).decide("sys", "ctx").await;
        assert_eq!(outcome.failure, Some(FailureClass::ParseError));
        assert_eq!(outcome.decision.action, TradeAction::Wait);
        assert!(outcome.decision.reasoning.contains("raw: I think we should buy everything"));
    }

    #[tokio::test]
    async fn test_probe_reports_unavailable() {
        let provider = Arc::new(FailingProvider(ApiError::Network("down".to_string())));
        let result = agent(provider, Duration::from_secs(1)).probe().await;
        assert!(matches!(result, Err(AgentError::Unavailable { .. })));
    }
}
