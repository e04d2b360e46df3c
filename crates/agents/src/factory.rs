use crate::error::AgentError;
use api_client::{AnthropicClient, DecisionProvider, OpenAiCompatClient, ScriptedProvider};
use core_types::{AgentSpec, ProviderKind};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// API keys supplied with a request, keyed by agent name or provider name.
///
/// Held in memory only; never persisted and never logged.
#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Credentials(HashMap<String, String>);

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.0.keys().collect();
        keys.sort();
        f.debug_struct("Credentials").field("keys", &keys).finish()
    }
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolves the key for one agent from, in order: an entry under the agent's
    /// name, an entry under its provider's name, the `AgentSpec` itself, then the
    /// provider's environment variable.
    pub fn resolve(&self, spec: &AgentSpec) -> Option<String> {
        self.resolve_with(spec, |name| std::env::var(name).ok())
    }

    pub fn resolve_with<F>(&self, spec: &AgentSpec, env: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |value: &String| !value.trim().is_empty();
        self.0
            .get(&spec.name)
            .filter(|v| non_empty(*v))
            .or_else(|| self.0.get(spec.provider.as_str()).filter(|v| non_empty(*v)))
            .cloned()
            .or_else(|| spec.credential.clone().filter(non_empty))
            .or_else(|| {
                spec.provider
                    .credential_env_var()
                    .and_then(|var| env(var))
                    .filter(non_empty)
            })
    }
}

/// Builds the decision provider for an agent.
pub trait ProviderFactory: Send + Sync {
    fn create(
        &self,
        spec: &AgentSpec,
        credential: Option<String>,
    ) -> Result<Arc<dyn DecisionProvider>, AgentError>;
}

/// The production factory: real HTTP clients, plus the offline scripted provider.
#[derive(Debug, Default, Clone)]
pub struct HttpProviderFactory;

impl ProviderFactory for HttpProviderFactory {
    fn create(
        &self,
        spec: &AgentSpec,
        credential: Option<String>,
    ) -> Result<Arc<dyn DecisionProvider>, AgentError> {
        let unavailable = |reason: String| AgentError::Unavailable {
            agent: spec.name.clone(),
            reason,
        };

        // Exhaustive: a new ProviderKind must be wired here.
        let provider: Arc<dyn DecisionProvider> = match spec.provider {
            ProviderKind::OpenAi
            | ProviderKind::DeepSeek
            | ProviderKind::Grok
            | ProviderKind::Qwen
            | ProviderKind::OpenAiCompat => Arc::new(
                OpenAiCompatClient::new(
                    spec.provider,
                    spec.model_id.clone(),
                    credential,
                    spec.base_url.clone(),
                    spec.temperature,
                )
                .map_err(|e| unavailable(e.to_string()))?,
            ),
            ProviderKind::Anthropic => Arc::new(
                AnthropicClient::new(
                    spec.model_id.clone(),
                    credential,
                    spec.base_url.clone(),
                    spec.temperature,
                )
                .map_err(|e| unavailable(e.to_string()))?,
            ),
            ProviderKind::Scripted => {
                Arc::new(ScriptedProvider::new(spec.model_id.clone(), spec.script.clone()))
            }
        };
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(provider: ProviderKind) -> AgentSpec {
        AgentSpec::new("alpha", provider, "model-x")
    }

    fn env_with(var: &'static str, value: &'static str) -> impl Fn(&str) -> Option<String> {
        move |name| (name == var).then(|| value.to_string())
    }

    #[test]
    fn test_resolution_order() {
        let mut spec = spec(ProviderKind::OpenAi);
        spec.credential = Some("from-spec".to_string());
        let env = env_with("OPENAI_API_KEY", "from-env");

        let mut creds = Credentials::new();
        assert_eq!(creds.resolve_with(&spec, &env).as_deref(), Some("from-spec"));

        creds.insert("openai", "from-provider");
        assert_eq!(creds.resolve_with(&spec, &env).as_deref(), Some("from-provider"));

        creds.insert("alpha", "from-agent");
        assert_eq!(creds.resolve_with(&spec, &env).as_deref(), Some("from-agent"));

        spec.credential = None;
        assert_eq!(
            Credentials::new().resolve_with(&spec, &env).as_deref(),
            Some("from-env")
        );
    }

    #[test]
    fn test_blank_values_are_skipped() {
        let spec = spec(ProviderKind::DeepSeek);
        let mut creds = Credentials::new();
        creds.insert("alpha", "  ");
        assert_eq!(creds.resolve_with(&spec, |_| None), None);
    }

    #[test]
    fn test_debug_output_hides_values() {
        let mut creds = Credentials::new();
        creds.insert("openai", "sk-live-secret");
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("openai"));
        assert!(!rendered.contains("sk-live-secret"));
    }

    #[test]
    fn test_factory_requires_credentials_for_hosted_providers() {
        let factory = HttpProviderFactory;
        assert!(matches!(
            factory.create(&spec(ProviderKind::Grok), None),
            Err(AgentError::Unavailable { .. })
        ));
        assert!(factory.create(&spec(ProviderKind::Grok), Some("xai-key".to_string())).is_ok());

        let scripted = factory.create(&spec(ProviderKind::Scripted), None).unwrap();
        assert_eq!(scripted.kind(), ProviderKind::Scripted);
    }
}
