//! Error taxonomy surfaced to the agent loop.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum LlmError {
    /// No API key or model configured.
    #[error("no AI provider configured: {0}")]
    MissingConfig(String),

    /// The provider rejected the credentials.
    #[error("the configured API key was rejected; check your credentials in Settings")]
    InvalidKey,

    /// The configured model does not exist on the provider.
    #[error("model {model:?} is not available on this provider; open Settings and pick a different model")]
    ModelNotFound { model: String },

    /// 429 or 5xx class failures; retryable.
    #[error("provider is rate-limiting or unavailable (HTTP {status})")]
    RateLimited { status: u16 },

    /// Network-level failure.
    #[error("provider request failed: {0}")]
    Transport(String),

    /// The provider reported it could not validate the JSON response.
    #[error("provider failed to validate the JSON response")]
    JsonValidateFailed,

    /// The reply parsed as no usable JSON object.
    #[error("response was not parseable JSON: {0}")]
    MalformedJson(String),

    /// The reply carried no content at all.
    #[error("provider returned an empty response")]
    NoContent,
}

impl LlmError {
    /// Errors that warrant the history-clearing minimal retry.
    pub fn is_json_validate_failed(&self) -> bool {
        matches!(self, LlmError::JsonValidateFailed)
    }
}
