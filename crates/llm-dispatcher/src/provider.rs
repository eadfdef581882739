//! Chat providers.
//!
//! Two concrete endpoints, both OpenAI-chat-compatible: OpenRouter (the
//! billing aggregator, which wants attribution headers) and Groq (the
//! low-latency inference host). A scripted in-memory provider backs tests
//! and offline development.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::errors::LlmError;
use crate::wire::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ErrorEnvelope, ResponseFormat,
};

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

const REFERER: &str = "https://github.com/tabpilot/tabpilot";
const APP_TITLE: &str = "Tabpilot";

/// Model-name fragments that imply image input support.
const VISION_MODEL_HINTS: &[&str] = &[
    "vision", "gpt-4o", "gpt-4.1", "claude", "gemini", "llava", "pixtral", "llama-4",
];

/// The two supported provider endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenRouter,
    Groq,
}

impl Provider {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::OpenRouter => OPENROUTER_BASE_URL,
            Provider::Groq => GROQ_BASE_URL,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::OpenRouter => write!(f, "openrouter"),
            Provider::Groq => write!(f, "groq"),
        }
    }
}

impl FromStr for Provider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openrouter" => Ok(Provider::OpenRouter),
            "groq" => Ok(Provider::Groq),
            other => Err(LlmError::MissingConfig(format!(
                "unknown provider {other:?}"
            ))),
        }
    }
}

/// One provider binding: endpoint, credentials, model.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider: Provider,
    pub model: String,
    pub api_key: String,
    /// Override for tests and self-hosted gateways.
    pub base_url: Option<String>,
    pub timeout: Duration,
}

impl ProviderConfig {
    pub fn new(provider: Provider, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            api_key: api_key.into(),
            base_url: None,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
    }
}

/// Request tuning for one chat call.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask for a JSON-object response (planner calls only; the analysts
    /// reply in plain text).
    pub json_response: bool,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 4_096,
            json_response: true,
        }
    }
}

impl ChatOptions {
    pub fn plain_text() -> Self {
        Self {
            json_response: false,
            ..Self::default()
        }
    }
}

/// True when a model name advertises image input.
pub fn model_supports_vision(model: &str) -> bool {
    let model = model.to_lowercase();
    VISION_MODEL_HINTS.iter().any(|hint| model.contains(hint))
}

/// A chat-capable model endpoint.
#[async_trait]
pub trait ChatApi: Send + Sync {
    fn model(&self) -> &str;

    fn supports_vision(&self) -> bool;

    /// One chat completion; returns the assistant's raw text.
    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        options: &ChatOptions,
    ) -> Result<String, LlmError>;
}

/// HTTP client for one provider binding.
pub struct HttpChatApi {
    client: Client,
    config: ProviderConfig,
}

impl HttpChatApi {
    pub fn new(config: ProviderConfig) -> Result<Self, LlmError> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::MissingConfig("API key is empty".into()));
        }
        if config.model.trim().is_empty() {
            return Err(LlmError::MissingConfig("model is empty".into()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| LlmError::Transport(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url().trim_end_matches('/'))
    }

    fn apply_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.bearer_auth(&self.config.api_key);
        match self.config.provider {
            Provider::OpenRouter => request
                .header("HTTP-Referer", REFERER)
                .header("X-Title", APP_TITLE),
            Provider::Groq => request,
        }
    }

    /// Map a non-2xx reply onto the driver's error taxonomy.
    fn classify_failure(&self, status: u16, body: &str) -> LlmError {
        if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
            let code = envelope
                .error
                .code
                .as_ref()
                .map(|c| c.to_string().to_lowercase())
                .unwrap_or_default();
            let kind = envelope.error.r#type.clone().unwrap_or_default();
            let message = envelope.error.message.clone().unwrap_or_default();
            if code.contains("json_validate_failed")
                || kind.contains("json_validate_failed")
                || message.contains("json_validate_failed")
            {
                return LlmError::JsonValidateFailed;
            }
            if code.contains("model_not_found")
                || message.contains("does not exist")
                || message.contains("model not found")
            {
                return LlmError::ModelNotFound {
                    model: self.config.model.clone(),
                };
            }
        }
        match status {
            401 | 403 => LlmError::InvalidKey,
            404 => LlmError::ModelNotFound {
                model: self.config.model.clone(),
            },
            429 => LlmError::RateLimited { status },
            500..=599 => LlmError::RateLimited { status },
            _ => LlmError::Transport(format!("HTTP {status}: {}", truncate(body, 300))),
        }
    }

    /// Cheap credential check: list models with the configured key.
    pub async fn validate(&self) -> Result<(), LlmError> {
        self.list_models().await.map(|_| ())
    }

    /// Model catalogue of the provider.
    pub async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let response = self
            .apply_headers(self.client.get(self.endpoint("models")))
            .send()
            .await
            .map_err(|err| LlmError::Transport(err.to_string()))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(self.classify_failure(status, &body));
        }

        #[derive(Deserialize)]
        struct ModelList {
            #[serde(default)]
            data: Vec<ModelEntry>,
        }
        #[derive(Deserialize)]
        struct ModelEntry {
            id: String,
        }

        let list: ModelList = response
            .json()
            .await
            .map_err(|err| LlmError::Transport(err.to_string()))?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let head: String = text.chars().take(max).collect();
        format!("{head}…")
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    fn model(&self) -> &str {
        &self.config.model
    }

    fn supports_vision(&self) -> bool {
        model_supports_vision(&self.config.model)
    }

    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        options: &ChatOptions,
    ) -> Result<String, LlmError> {
        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            response_format: options.json_response.then(ResponseFormat::json_object),
        };

        let response = self
            .apply_headers(self.client.post(self.endpoint("chat/completions")))
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::Transport(err.to_string()))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let text = response.text().await.unwrap_or_default();
            let err = self.classify_failure(status, &text);
            warn!(
                target: "llm_dispatcher",
                provider = %self.config.provider,
                status,
                error = %err,
                "chat request failed"
            );
            return Err(err);
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| LlmError::Transport(format!("invalid response body: {err}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .and_then(|content| content.into_text())
            .filter(|text| !text.trim().is_empty())
            .ok_or(LlmError::NoContent)
    }
}

/// Record of one scripted call, for assertions.
#[derive(Debug, Clone)]
pub struct ScriptedCall {
    pub messages: Vec<ChatMessage>,
    pub options: ChatOptions,
}

impl ScriptedCall {
    /// Text of the final user message.
    pub fn last_user_text(&self) -> String {
        self.messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, tabpilot_core_types::Role::User))
            .map(|m| m.content.as_text())
            .unwrap_or_default()
    }

    pub fn has_image(&self) -> bool {
        self.messages.iter().any(|m| m.content.has_image())
    }
}

/// Deterministic provider for tests and offline development: replies are
/// dequeued in order, calls are recorded.
pub struct ScriptedChatApi {
    model: String,
    vision: bool,
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: Mutex<Vec<ScriptedCall>>,
}

impl ScriptedChatApi {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            vision: false,
            replies: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_vision(mut self) -> Self {
        self.vision = true;
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().push_back(Ok(reply.into()));
    }

    pub fn push_error(&self, error: LlmError) {
        self.replies.lock().push_back(Err(error));
    }

    pub fn calls(&self) -> Vec<ScriptedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ChatApi for ScriptedChatApi {
    fn model(&self) -> &str {
        &self.model
    }

    fn supports_vision(&self) -> bool {
        self.vision
    }

    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        options: &ChatOptions,
    ) -> Result<String, LlmError> {
        self.calls.lock().push(ScriptedCall {
            messages,
            options: options.clone(),
        });
        match self.replies.lock().pop_front() {
            Some(reply) => reply,
            None => Err(LlmError::NoContent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_strings_round_trip() {
        assert_eq!("openrouter".parse::<Provider>().unwrap(), Provider::OpenRouter);
        assert_eq!("Groq".parse::<Provider>().unwrap(), Provider::Groq);
        assert!("hal9000".parse::<Provider>().is_err());
    }

    #[test]
    fn vision_heuristic_matches_known_families() {
        assert!(model_supports_vision("meta-llama/llama-4-scout-17b-16e-instruct"));
        assert!(model_supports_vision("openai/gpt-4o-mini"));
        assert!(model_supports_vision("llama-3.2-90b-vision-preview"));
        assert!(!model_supports_vision("deepseek/deepseek-chat-v3"));
    }

    #[test]
    fn empty_key_is_rejected_up_front() {
        let config = ProviderConfig::new(Provider::Groq, "llama-3.3-70b-versatile", "  ");
        assert!(matches!(
            HttpChatApi::new(config),
            Err(LlmError::MissingConfig(_))
        ));
    }

    #[tokio::test]
    async fn scripted_api_replays_in_order_and_records_calls() {
        let api = ScriptedChatApi::new("test-model");
        api.push_reply("first");
        api.push_reply("second");

        let opts = ChatOptions::default();
        let r1 = api.chat(vec![ChatMessage::user("a")], &opts).await.unwrap();
        let r2 = api.chat(vec![ChatMessage::user("b")], &opts).await.unwrap();
        assert_eq!((r1.as_str(), r2.as_str()), ("first", "second"));
        assert_eq!(api.call_count(), 2);
        assert_eq!(api.calls()[1].last_user_text(), "b");

        // Exhausted script degrades to NoContent.
        assert!(matches!(
            api.chat(vec![ChatMessage::user("c")], &opts).await,
            Err(LlmError::NoContent)
        ));
    }
}
