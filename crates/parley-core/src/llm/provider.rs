use crate::config::Settings;
use crate::constants::{endpoints, env, models};
use crate::error::{ParleyError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Identifies a chat provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenAI,
    Anthropic,
}

impl ProviderId {
    /// Accepts `openai`, `anthropic` or `claude`, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAI),
            "anthropic" | "claude" => Some(Self::Anthropic),
            _ => None,
        }
    }

    pub fn all() -> [ProviderId; 2] {
        [Self::OpenAI, Self::Anthropic]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAI => "OpenAI",
            Self::Anthropic => "Anthropic",
        }
    }

    /// Lowercase key used in config files and session records.
    pub fn key(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAI => endpoints::OPENAI_BASE_URL,
            Self::Anthropic => endpoints::ANTHROPIC_BASE_URL,
        }
    }

    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::OpenAI => env::OPENAI_API_KEY,
            Self::Anthropic => env::ANTHROPIC_API_KEY,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAI => models::DEFAULT_OPENAI_MODEL,
            Self::Anthropic => models::DEFAULT_ANTHROPIC_MODEL,
        }
    }

    pub fn known_models(&self) -> &'static [&'static str] {
        match self {
            Self::OpenAI => models::OPENAI_MODELS,
            Self::Anthropic => models::ANTHROPIC_MODELS,
        }
    }

    /// Loose check of an API key's shape. Not a substitute for a real call.
    pub fn key_looks_valid(&self, key: &str) -> bool {
        match self {
            Self::OpenAI => key.starts_with("sk-") && key.len() > 20,
            Self::Anthropic => key.starts_with("sk-ant-") && key.len() > 20,
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Resolved connection settings for a single provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub id: ProviderId,
    pub api_key: Option<String>,
    pub base_url: String,
}

impl ProviderConfig {
    pub fn is_available(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

/// Builds clients for the configured providers.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderId, ProviderConfig>,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl ProviderRegistry {
    pub fn from_settings(settings: &Settings) -> Self {
        let mut providers = HashMap::new();
        for id in ProviderId::all() {
            let ps = settings.provider(id);
            providers.insert(
                id,
                ProviderConfig {
                    id,
                    api_key: ps.api_key.clone(),
                    base_url: ps.base_url.clone(),
                },
            );
        }

        Self {
            providers,
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            timeout: Duration::from_secs(settings.request_timeout_secs),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn get_config(&self, id: ProviderId) -> Option<&ProviderConfig> {
        self.providers.get(&id)
    }

    /// Providers with an API key, in a stable order.
    pub fn available_providers(&self) -> Vec<ProviderId> {
        ProviderId::all()
            .into_iter()
            .filter(|id| self.providers.get(id).is_some_and(|c| c.is_available()))
            .collect()
    }

    pub fn is_available(&self, id: ProviderId) -> bool {
        self.providers.get(&id).is_some_and(|c| c.is_available())
    }

    /// Which provider serves a known model name.
    pub fn provider_for_model(model: &str) -> Option<ProviderId> {
        ProviderId::all()
            .into_iter()
            .find(|id| id.known_models().contains(&model))
    }

    /// Build an LLM client for a specific provider and model.
    pub fn build_client(
        &self,
        provider: ProviderId,
        model: &str,
    ) -> Result<Box<dyn super::LlmClient>> {
        let config = self.providers.get(&provider).ok_or_else(|| {
            ParleyError::Config(format!("Provider {provider} not configured"))
        })?;

        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                ParleyError::Config(format!(
                    "Set {} environment variable for {}",
                    provider.api_key_env(),
                    provider.name()
                ))
            })?;

        tracing::debug!(provider = %provider, model, "building client");

        match provider {
            ProviderId::OpenAI => Ok(Box::new(
                super::OpenAIClient::new(api_key)
                    .with_model(model)
                    .with_base_url(&config.base_url)
                    .with_max_tokens(self.max_tokens)
                    .with_temperature(self.temperature)
                    .with_timeout(self.timeout),
            )),
            ProviderId::Anthropic => Ok(Box::new(
                super::ClaudeClient::new(api_key)
                    .with_model(model)
                    .with_base_url(&config.base_url)
                    .with_max_tokens(self.max_tokens)
                    .with_temperature(self.temperature)
                    .with_timeout(self.timeout),
            )),
        }
    }
}
