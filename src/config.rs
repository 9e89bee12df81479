//! Bridge configuration: JSON file with `${ENV_VAR}` substitution.
//!
//! The config file mirrors the original controller layout: top-level
//! bridge settings plus a `providers` table keyed by provider name.
//! Values like `"${ANTHROPIC_API_KEY}"` are substituted from the
//! environment (after `.env` loading in `main`).

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default listen address for the emulator connection.
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8888;

/// Default number of retry attempts for transient provider failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential retry backoff, in seconds.
pub const DEFAULT_RETRY_BACKOFF_SECS: u64 = 2;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {0:?}: {1}")]
    Read(String, #[source] std::io::Error),
    #[error("failed to parse config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no provider entry for {0:?} in the providers table")]
    UnknownProvider(String),
}

/// Which decision backend to talk to. Selected once at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
    Google,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Google => "google",
        };
        f.write_str(s)
    }
}

/// Static per-backend configuration. Loaded once, never mutated
/// mid-session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: String,
    pub model_name: String,
    /// Override for the API base URL (self-hosted gateways, proxies).
    pub base_url: Option<String>,
    pub max_tokens: u32,
    /// Retry ceiling for transient failures before falling back.
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries, in seconds.
    pub retry_backoff_secs: u64,
    /// Hard timeout for a single backend call, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model_name: String::new(),
            base_url: None,
            max_tokens: 1024,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff_secs: DEFAULT_RETRY_BACKOFF_SECS,
            request_timeout_secs: 60,
        }
    }
}

impl ProviderConfig {
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Top-level bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
    pub notepad_path: String,
    /// Minimum wall-clock interval between consecutive decisions.
    pub decision_cooldown_secs: f64,
    /// Short-term log capacity, in turns.
    pub short_term_capacity: usize,
    /// Reconnect attempts after transport loss before terminating.
    pub max_reconnects: u32,
    /// Active decision backend.
    pub llm_provider: ProviderKind,
    /// Per-backend settings, keyed by provider name.
    pub providers: HashMap<String, ProviderConfig>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            notepad_path: "notepad.txt".to_string(),
            decision_cooldown_secs: 3.0,
            short_term_capacity: crate::memory::DEFAULT_SHORT_TERM_CAPACITY,
            max_reconnects: 3,
            llm_provider: ProviderKind::Anthropic,
            providers: HashMap::new(),
        }
    }
}

impl BridgeConfig {
    /// Load from a JSON file, substituting `${VAR}` references from the
    /// environment before parsing.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.display().to_string(), e))?;
        Self::from_json(&raw)
    }

    /// Parse config JSON (post env substitution). Split out for tests.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let substituted = substitute_env_vars(raw);
        let config: Self = serde_json::from_str(&substituted)?;

        if let Some(provider) = config.providers.get(&config.llm_provider.to_string()) {
            if provider.api_key.is_empty() {
                tracing::warn!(provider = %config.llm_provider, "no API key configured");
            }
        }
        Ok(config)
    }

    /// Settings for the active provider.
    pub fn active_provider(&self) -> Result<&ProviderConfig, ConfigError> {
        let key = self.llm_provider.to_string();
        self.providers
            .get(&key)
            .ok_or(ConfigError::UnknownProvider(key))
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_notepad_path(mut self, path: impl Into<String>) -> Self {
        self.notepad_path = path.into();
        self
    }

    pub fn with_cooldown_secs(mut self, secs: f64) -> Self {
        self.decision_cooldown_secs = secs;
        self
    }

    pub fn with_provider(mut self, kind: ProviderKind, provider: ProviderConfig) -> Self {
        self.llm_provider = kind;
        self.providers.insert(kind.to_string(), provider);
        self
    }
}

static ENV_VAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z0-9_]+)\}").expect("valid regex"));

/// Replace `${VAR_NAME}` with the environment value; missing variables
/// become empty strings with a logged warning, matching how key presence
/// is validated separately.
fn substitute_env_vars(raw: &str) -> String {
    ENV_VAR_RE
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            std::env::var(name).unwrap_or_else(|_| {
                tracing::warn!(var = name, "environment variable not found");
                String::new()
            })
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8888);
        assert_eq!(config.short_term_capacity, 10);
        assert_eq!(config.max_reconnects, 3);
    }

    #[test]
    fn test_from_json_with_providers() {
        let raw = r#"{
            "port": 9999,
            "decision_cooldown_secs": 1.5,
            "llm_provider": "openai",
            "providers": {
                "openai": {
                    "api_key": "sk-test",
                    "model_name": "gpt-4o",
                    "max_tokens": 2048
                }
            }
        }"#;

        let config = BridgeConfig::from_json(raw).unwrap();
        assert_eq!(config.port, 9999);
        assert_eq!(config.llm_provider, ProviderKind::OpenAi);

        let provider = config.active_provider().unwrap();
        assert_eq!(provider.api_key, "sk-test");
        assert_eq!(provider.model_name, "gpt-4o");
        assert_eq!(provider.max_tokens, 2048);
        // Unspecified fields come from defaults.
        assert_eq!(provider.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_env_substitution() {
        std::env::set_var("EMU_AGENT_TEST_KEY", "secret-123");
        let raw = r#"{
            "llm_provider": "anthropic",
            "providers": {
                "anthropic": {
                    "api_key": "${EMU_AGENT_TEST_KEY}",
                    "model_name": "claude"
                }
            }
        }"#;

        let config = BridgeConfig::from_json(raw).unwrap();
        assert_eq!(config.active_provider().unwrap().api_key, "secret-123");
    }

    #[test]
    fn test_missing_provider_entry() {
        let raw = r#"{ "llm_provider": "google", "providers": {} }"#;
        let config = BridgeConfig::from_json(raw).unwrap();
        assert!(matches!(
            config.active_provider(),
            Err(ConfigError::UnknownProvider(_))
        ));
    }
}
