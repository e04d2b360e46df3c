use crate::error::ApiError;
use crate::responses::{
    AnthropicRequest, AnthropicResponse, ChatCompletionRequest, ChatCompletionResponse, ChatMessage,
};
use async_trait::async_trait;
use core_types::{ProviderKind, TokenUsage};
use std::time::Duration;

/// What an agent is asked in one cycle.
#[derive(Debug, Clone)]
pub struct DecisionRequest {
    pub system_prompt: String,
    pub market_context: String,
    /// Upper bound on the whole call, connection included.
    pub timeout: Duration,
}

/// Raw model output. Nothing about `text` is trusted until it has been parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub token_usage: TokenUsage,
}

/// The decision collaborator: one instance per agent.
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn model_id(&self) -> &str;

    /// Cheap reachability probe. Implementations should not spend tokens here.
    async fn is_available(&self) -> bool;

    async fn decide(&self, request: &DecisionRequest) -> Result<Completion, ApiError>;
}

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 1024;

/// Default chat-completions endpoint for each OpenAI-compatible vendor.
pub fn default_base_url(kind: ProviderKind) -> Option<&'static str> {
    match kind {
        ProviderKind::OpenAi => Some("https://api.openai.com/v1"),
        ProviderKind::DeepSeek => Some("https://api.deepseek.com/v1"),
        ProviderKind::Grok => Some("https://api.x.ai/v1"),
        ProviderKind::Qwen => Some("https://dashscope.aliyuncs.com/compatible-mode/v1"),
        ProviderKind::Anthropic => Some(ANTHROPIC_BASE_URL),
        ProviderKind::OpenAiCompat | ProviderKind::Scripted => None,
    }
}

fn build_http_client() -> Result<reqwest::Client, ApiError> {
    reqwest::Client::builder()
        .user_agent(concat!("arena/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ApiError::InvalidConfig(e.to_string()))
}

async fn read_error(response: reqwest::Response) -> ApiError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ApiError::from_status(status, body)
}

/// Client for any vendor speaking the OpenAI chat-completions protocol:
/// OpenAI itself, DeepSeek, Grok, Qwen (DashScope compatible mode) and
/// self-hosted servers (`openai_compat`).
pub struct OpenAiCompatClient {
    kind: ProviderKind,
    model_id: String,
    base_url: String,
    api_key: Option<String>,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    pub fn new(
        kind: ProviderKind,
        model_id: impl Into<String>,
        api_key: Option<String>,
        base_url: Option<String>,
        temperature: Option<f32>,
    ) -> Result<Self, ApiError> {
        let base_url = base_url
            .or_else(|| default_base_url(kind).map(str::to_string))
            .ok_or_else(|| {
                ApiError::InvalidConfig(format!("provider '{}' requires a base_url", kind))
            })?;

        if kind.requires_credential() && api_key.as_deref().is_none_or(str::is_empty) {
            return Err(ApiError::MissingCredential(kind.to_string()));
        }

        Ok(Self {
            kind,
            model_id: model_id.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            temperature,
            client: build_http_client()?,
        })
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) if !key.is_empty() => builder.bearer_auth(key),
            _ => builder,
        }
    }
}

/// Extracts the first choice and token usage from a chat-completions body.
pub fn parse_chat_completion(body: &str) -> Result<Completion, ApiError> {
    let response: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
    let text = response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| ApiError::InvalidResponse("response contained no choices".to_string()))?;
    let usage = response.usage.unwrap_or_default();

    Ok(Completion {
        text,
        token_usage: TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        },
    })
}

/// Joins the text blocks of an Anthropic messages body.
pub fn parse_anthropic_message(body: &str) -> Result<Completion, ApiError> {
    let response: AnthropicResponse =
        serde_json::from_str(body).map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
    let text: String = response
        .content
        .iter()
        .filter(|block| block.kind == "text")
        .map(|block| block.text.as_str())
        .collect();
    if text.is_empty() {
        return Err(ApiError::InvalidResponse("response contained no text".to_string()));
    }
    let usage = response.usage.unwrap_or_default();

    Ok(Completion {
        text,
        token_usage: TokenUsage {
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            total_tokens: usage.input_tokens + usage.output_tokens,
        },
    })
}

#[async_trait]
impl DecisionProvider for OpenAiCompatClient {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/models", self.base_url);
        let request = self.authorize(self.client.get(&url).timeout(Duration::from_secs(10)));
        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(provider = %self.kind, error = %e, "Availability probe failed");
                false
            }
        }
    }

    async fn decide(&self, request: &DecisionRequest) -> Result<Completion, ApiError> {
        let body = ChatCompletionRequest {
            model: self.model_id.clone(),
            messages: vec![
                ChatMessage { role: "system".to_string(), content: request.system_prompt.clone() },
                ChatMessage { role: "user".to_string(), content: request.market_context.clone() },
            ],
            temperature: self.temperature,
            stream: false,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .authorize(self.client.post(&url).timeout(request.timeout).json(&body))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(read_error(response).await);
        }

        let text = response.text().await?;
        let completion = parse_chat_completion(&text)?;
        tracing::debug!(
            provider = %self.kind,
            model = %self.model_id,
            total_tokens = completion.token_usage.total_tokens,
            "Completion received"
        );
        Ok(completion)
    }
}

/// Client for the Anthropic messages API.
pub struct AnthropicClient {
    model_id: String,
    base_url: String,
    api_key: String,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(
        model_id: impl Into<String>,
        api_key: Option<String>,
        base_url: Option<String>,
        temperature: Option<f32>,
    ) -> Result<Self, ApiError> {
        let api_key = api_key
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ApiError::MissingCredential(ProviderKind::Anthropic.to_string()))?;
        Ok(Self {
            model_id: model_id.into(),
            base_url: base_url
                .unwrap_or_else(|| ANTHROPIC_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            temperature,
            client: build_http_client()?,
        })
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
    }
}

#[async_trait]
impl DecisionProvider for AnthropicClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/v1/models", self.base_url);
        let request = self.authorize(self.client.get(&url).timeout(Duration::from_secs(10)));
        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(provider = "anthropic", error = %e, "Availability probe failed");
                false
            }
        }
    }

    async fn decide(&self, request: &DecisionRequest) -> Result<Completion, ApiError> {
        let body = AnthropicRequest {
            model: self.model_id.clone(),
            max_tokens: ANTHROPIC_MAX_TOKENS,
            system: request.system_prompt.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: request.market_context.clone(),
            }],
            temperature: self.temperature,
        };

        let url = format!("{}/v1/messages", self.base_url);
        let response = self
            .authorize(self.client.post(&url).timeout(request.timeout).json(&body))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(read_error(response).await);
        }

        let text = response.text().await?;
        parse_anthropic_message(&text)
    }
}
