use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::constants::{defaults, endpoints, env, storage};
use crate::error::{ParleyError, Result};
use crate::llm::provider::ProviderId;

/// Connection settings for one provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderSettings {
    /// Normally taken from the environment; never written back to disk.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub openai: ProviderSettings,
    pub anthropic: ProviderSettings,
    pub default_provider: Option<ProviderId>,
    pub default_model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub request_timeout_secs: u64,
    pub data_dir: Option<PathBuf>,
    pub autosave: bool,
    pub stream: bool,
    pub theme: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            openai: ProviderSettings {
                api_key: None,
                base_url: endpoints::OPENAI_BASE_URL.to_string(),
            },
            anthropic: ProviderSettings {
                api_key: None,
                base_url: endpoints::ANTHROPIC_BASE_URL.to_string(),
            },
            default_provider: None,
            default_model: None,
            max_tokens: defaults::MAX_TOKENS,
            temperature: defaults::TEMPERATURE,
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
            data_dir: None,
            autosave: true,
            stream: false,
            theme: "dark".to_string(),
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: String::new(),
        }
    }
}

impl Settings {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(storage::APP_DIR)
            .join(storage::CONFIG_FILE)
    }

    /// Load settings from every layer: defaults, the TOML config file, a
    /// `.env` file in the working directory and the process environment.
    pub fn load() -> Result<Self> {
        let mut settings = Self::load_file(&Self::config_path())?;

        let mut vars: HashMap<String, String> = std::env::vars().collect();
        let env_path = Path::new(storage::ENV_FILE);
        if env_path.exists() {
            let content = std::fs::read_to_string(env_path)?;
            for (key, value) in parse_env_file(&content) {
                vars.entry(key).or_insert(value);
            }
        }

        settings.apply_env(&vars)?;
        Ok(settings)
    }

    /// Read a TOML config file, falling back to defaults when it is absent.
    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let mut settings: Settings = toml::from_str(&content)
            .map_err(|e| ParleyError::Config(format!("{}: {e}", path.display())))?;
        settings.fill_base_urls();
        settings.validate()?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(settings)
    }

    /// Defaults overlaid with the given variables only. Used by tests and
    /// by callers that manage their own environment.
    pub fn from_env_map(vars: &HashMap<String, String>) -> Result<Self> {
        let mut settings = Self::default();
        settings.apply_env(vars)?;
        Ok(settings)
    }

    pub fn apply_env(&mut self, vars: &HashMap<String, String>) -> Result<()> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(key) = get(env::OPENAI_API_KEY) {
            self.openai.api_key = Some(key);
        }
        if let Some(key) = get(env::ANTHROPIC_API_KEY) {
            self.anthropic.api_key = Some(key);
        }
        if let Some(url) = get(env::OPENAI_BASE_URL) {
            self.openai.base_url = url;
        }
        if let Some(url) = get(env::ANTHROPIC_BASE_URL) {
            self.anthropic.base_url = url;
        }
        if let Some(name) = get(env::DEFAULT_PROVIDER) {
            let id = ProviderId::parse(&name).ok_or_else(|| {
                ParleyError::Config(format!(
                    "{} must be 'openai' or 'anthropic', got '{name}'",
                    env::DEFAULT_PROVIDER
                ))
            })?;
            self.default_provider = Some(id);
        }
        if let Some(model) = get(env::DEFAULT_MODEL) {
            self.default_model = Some(model);
        }
        if let Some(raw) = get(env::MAX_TOKENS) {
            self.max_tokens = raw.parse().map_err(|_| {
                ParleyError::Config(format!("{} must be a positive integer, got '{raw}'", env::MAX_TOKENS))
            })?;
        }
        if let Some(raw) = get(env::TEMPERATURE) {
            self.temperature = raw.parse().map_err(|_| {
                ParleyError::Config(format!("{} must be a number, got '{raw}'", env::TEMPERATURE))
            })?;
        }
        if let Some(raw) = get(env::TIMEOUT_SECS) {
            self.request_timeout_secs = raw.parse().map_err(|_| {
                ParleyError::Config(format!("{} must be a whole number of seconds, got '{raw}'", env::TIMEOUT_SECS))
            })?;
        }
        if let Some(dir) = get(env::DATA_DIR) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = get(env::AUTOSAVE) {
            self.autosave = parse_bool(&raw).ok_or_else(|| {
                ParleyError::Config(format!("{} must be true or false, got '{raw}'", env::AUTOSAVE))
            })?;
        }

        self.validate()
    }

    fn fill_base_urls(&mut self) {
        if self.openai.base_url.is_empty() {
            self.openai.base_url = endpoints::OPENAI_BASE_URL.to_string();
        }
        if self.anthropic.base_url.is_empty() {
            self.anthropic.base_url = endpoints::ANTHROPIC_BASE_URL.to_string();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(ParleyError::Config("max_tokens must be greater than 0".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ParleyError::Config(format!(
                "temperature must be between 0 and 2, got {}",
                self.temperature
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ParleyError::Config("request timeout must be greater than 0".into()));
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ParleyError::Config(e.to_string()))?;
        crate::storage::write_atomic(&config_path, content.as_bytes())
    }

    pub fn provider(&self, id: ProviderId) -> &ProviderSettings {
        match id {
            ProviderId::OpenAI => &self.openai,
            ProviderId::Anthropic => &self.anthropic,
        }
    }

    /// Root directory for sessions and contexts.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(storage::APP_DIR)
        })
    }

    /// Providers that have an API key configured.
    pub fn available_providers(&self) -> Vec<ProviderId> {
        ProviderId::all()
            .into_iter()
            .filter(|id| {
                self.provider(*id)
                    .api_key
                    .as_deref()
                    .is_some_and(|k| !k.trim().is_empty())
            })
            .collect()
    }

    /// The provider to start with: the configured default when it has a key,
    /// otherwise the first provider that does.
    pub fn require_provider(&self) -> Result<ProviderId> {
        let available = self.available_providers();
        if let Some(preferred) = self.default_provider {
            if available.contains(&preferred) {
                return Ok(preferred);
            }
            if !available.is_empty() {
                tracing::warn!(
                    provider = %preferred,
                    "default provider has no API key, falling back"
                );
            }
        }
        available.first().copied().ok_or_else(|| {
            ParleyError::Config(format!(
                "No API key found. Set {} or {} (run with --create-env for a template)",
                env::OPENAI_API_KEY,
                env::ANTHROPIC_API_KEY
            ))
        })
    }

    /// The model to start with for `provider`.
    pub fn model_for(&self, provider: ProviderId) -> String {
        match (&self.default_model, self.default_provider) {
            (Some(model), Some(p)) if p == provider => model.clone(),
            (Some(model), None) if provider.known_models().contains(&model.as_str()) => {
                model.clone()
            }
            _ => provider.default_model().to_string(),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse `KEY=VALUE` lines. Blank lines and `#` comments are skipped,
/// `export ` prefixes are tolerated and matching quotes are stripped.
pub fn parse_env_file(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            let value = value.trim();
            let value = ['"', '\'']
                .iter()
                .find_map(|q| {
                    value
                        .strip_prefix(*q)
                        .and_then(|v| v.strip_suffix(*q))
                })
                .unwrap_or(value);
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

pub const ENV_SAMPLE: &str = "\
# parley configuration
# Copy this file to .env and fill in at least one API key.

# OpenAI
OPENAI_API_KEY=
# OPENAI_BASE_URL=https://api.openai.com/v1

# Anthropic
ANTHROPIC_API_KEY=
# ANTHROPIC_BASE_URL=https://api.anthropic.com/v1

# Defaults
DEFAULT_PROVIDER=openai
DEFAULT_MODEL=gpt-4o
MAX_TOKENS=1000
TEMPERATURE=0.7

# Storage and behaviour
# PARLEY_DATA_DIR=
# PARLEY_TIMEOUT_SECS=30
# PARLEY_AUTOSAVE=true
";

/// Write the `.env.sample` template. Returns `false` when the file already
/// exists and was left alone.
pub fn write_env_sample(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    crate::storage::write_atomic(path, ENV_SAMPLE.as_bytes())?;
    Ok(true)
}
