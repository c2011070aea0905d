//! Application configuration.
//!
//! Config is stored at `~/.config/tkb/config.toml` and contains:
//! - API key and endpoint of the OpenAI-compatible model service
//! - Model names for embeddings, chat and vision
//! - Retry policy for downstream calls
//! - Optional per-tier limit overrides

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::quota::PlanCatalog;
use crate::retry::RetryPolicy;
use crate::types::{LimitOverrides, PlanTier};

const CONFIG_DIR: &str = "tkb";
const CONFIG_FILE: &str = "config.toml";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key of the model service.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL for OpenAI-compatible API (default: https://api.openai.com).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_vision_model")]
    pub vision_model: String,

    /// Retries after the first attempt of a throttled call.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,

    /// Chunks retrieved per query when the caller gives no `top_k`.
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Limit overrides per tier, e.g. `[plans.basic] documents = 300`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub plans: BTreeMap<PlanTier, LimitOverrides>,
}

fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_vision_model() -> String {
    "gpt-4o".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_jitter_ms() -> u64 {
    1000
}

fn default_top_k() -> usize {
    3
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            embedding_model: default_embedding_model(),
            chat_model: default_chat_model(),
            vision_model: default_vision_model(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_jitter_ms: default_max_jitter_ms(),
            default_top_k: default_top_k(),
            plans: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// Load config from the default location.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).context("Failed to read config file")?;

        Self::parse(&content)
    }

    /// Parse and validate a TOML document.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the default location.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&path, content).context("Failed to write config file")
    }

    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.base_url)
            .with_context(|| format!("Invalid base_url: {}", self.base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("base_url must be http or https, got {}", url.scheme());
        }
        if self.default_top_k == 0 {
            bail!("default_top_k must be at least 1");
        }
        self.catalog()?;
        Ok(())
    }

    /// Get the API key as a SecretString.
    pub fn api_key_secret(&self) -> Option<SecretString> {
        self.api_key.clone().map(SecretString::from)
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_ref()
            .map(|k| !k.is_empty())
            .unwrap_or(false)
    }

    pub fn set_api_key(&mut self, key: String) {
        self.api_key = Some(key);
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries)
            .with_base_delay(Duration::from_millis(self.base_delay_ms))
            .with_max_jitter(Duration::from_millis(self.max_jitter_ms))
    }

    /// Built-in tiers with the configured overrides applied.
    pub fn catalog(&self) -> Result<PlanCatalog> {
        PlanCatalog::with_overrides(&self.plans).context("Invalid plan overrides")
    }

    /// Get the config file path.
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.api_key.is_none());
        assert_eq!(config.base_url, "https://api.openai.com");
        assert_eq!(config.embedding_model, "text-embedding-3-small");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.default_top_k, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_has_api_key() {
        let mut config = AppConfig::default();
        assert!(!config.has_api_key());

        config.set_api_key("sk-test123".to_string());
        assert!(config.has_api_key());
    }

    #[test]
    fn test_serialize_deserialize() {
        let mut config = AppConfig::default();
        config.set_api_key("sk-test".to_string());

        let toml_str = toml::to_string(&config).unwrap();
        let parsed = AppConfig::parse(&toml_str).unwrap();

        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = AppConfig::parse("max_retries = 5\n").unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.base_delay_ms, 1000);
        assert_eq!(config.chat_model, "gpt-4o-mini");
    }

    #[test]
    fn test_plan_overrides() {
        let config = AppConfig::parse(
            r#"
            [plans.basic]
            documents = 300
            "#,
        )
        .unwrap();
        let catalog = config.catalog().unwrap();
        assert_eq!(catalog.limits_for(PlanTier::Basic).documents, 300);
    }

    #[test]
    fn test_non_monotonic_overrides_are_rejected() {
        let result = AppConfig::parse(
            r#"
            [plans.premium]
            vectors = 10
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(AppConfig::parse("base_url = \"not a url\"\n").is_err());
        assert!(AppConfig::parse("base_url = \"ftp://example.com\"\n").is_err());
    }

    #[test]
    fn test_retry_policy() {
        let config = AppConfig::default();
        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(1000));
    }
}
