//! Driver settings resolved from host storage.

use anyhow::{bail, Result};

use tabpilot_core_types::ports::keys;
use tabpilot_core_types::Storage;
use tabpilot_llm_dispatcher::Provider;

/// Fallback planner model per provider.
pub const DEFAULT_OPENROUTER_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_GROQ_MODEL: &str = "llama-3.3-70b-versatile";
/// Vision analyst model on Groq for the two-step handoff.
pub const DEFAULT_VISION_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";
/// Search analyst model (server-side web search tool-use).
pub const DEFAULT_SEARCH_MODEL: &str = "compound-beta";

/// User-configured driver settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: Provider,
    pub model: String,
    pub api_key: String,
    /// Vision analyst for text-only planners.
    pub vision_model: String,
    pub search_enabled: bool,
    pub search_model: String,
}

impl Settings {
    /// Resolve settings from storage, applying defaults for everything but
    /// the API key.
    pub async fn load(storage: &dyn Storage) -> Result<Self> {
        let provider: Provider = storage
            .get(keys::AI_PROVIDER)
            .await?
            .as_deref()
            .unwrap_or("openrouter")
            .parse()?;

        let model = match storage.get(keys::AI_MODEL).await? {
            Some(model) if !model.trim().is_empty() => model,
            _ => default_model(provider).to_string(),
        };

        let api_key = match storage.get(keys::AI_API_KEY).await? {
            Some(key) if !key.trim().is_empty() => key,
            _ => bail!("no API key configured; open Settings and add one"),
        };

        let vision_model = storage
            .get(keys::GROQ_VISION_MODEL)
            .await?
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string());

        let search_enabled = storage
            .get(keys::SEARCH_ENABLED)
            .await?
            .map(|v| matches!(v.trim(), "true" | "1" | "yes"))
            .unwrap_or(false);

        let search_model = storage
            .get(keys::SEARCH_MODEL)
            .await?
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SEARCH_MODEL.to_string());

        Ok(Self {
            provider,
            model,
            api_key,
            vision_model,
            search_enabled,
            search_model,
        })
    }
}

fn default_model(provider: Provider) -> &'static str {
    match provider {
        Provider::OpenRouter => DEFAULT_OPENROUTER_MODEL,
        Provider::Groq => DEFAULT_GROQ_MODEL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryStorage;

    #[tokio::test]
    async fn defaults_fill_everything_but_the_key() {
        let storage = MemoryStorage::new();
        storage.seed(keys::AI_API_KEY, "sk-test").await;
        let settings = Settings::load(&storage).await.unwrap();
        assert_eq!(settings.provider, Provider::OpenRouter);
        assert_eq!(settings.model, DEFAULT_OPENROUTER_MODEL);
        assert!(!settings.search_enabled);
        assert_eq!(settings.vision_model, DEFAULT_VISION_MODEL);
    }

    #[tokio::test]
    async fn missing_key_is_a_configuration_error() {
        let storage = MemoryStorage::new();
        let err = Settings::load(&storage).await.unwrap_err();
        assert!(err.to_string().contains("Settings"));
    }

    #[tokio::test]
    async fn groq_settings_round_trip() {
        let storage = MemoryStorage::new();
        storage.seed(keys::AI_PROVIDER, "groq").await;
        storage.seed(keys::AI_API_KEY, "gsk-test").await;
        storage.seed(keys::SEARCH_ENABLED, "true").await;
        let settings = Settings::load(&storage).await.unwrap();
        assert_eq!(settings.provider, Provider::Groq);
        assert_eq!(settings.model, DEFAULT_GROQ_MODEL);
        assert!(settings.search_enabled);
        assert_eq!(settings.search_model, DEFAULT_SEARCH_MODEL);
    }
}
