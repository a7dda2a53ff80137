//! Provider Configuration
//!
//! Defines the configuration schema for providers and the routing policy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::api::Purpose;
use crate::error::{GatewayError, Result};
use crate::router::key_pool::MAX_COOLDOWN;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Provider configurations keyed by provider name
    pub providers: HashMap<String, ProviderConfig>,

    /// Routing and recovery policy
    #[serde(default)]
    pub routing: RoutingConfig,
}

/// Which variant of provider client serves a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Hosted API that needs credentials
    #[default]
    Cloud,

    /// Offline-capable endpoint on the local machine (e.g. Ollama)
    Local,
}

/// Subscription tier of the caller
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Hobby,
    Pro,
    Elite,
}

impl std::str::FromStr for Tier {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hobby" | "free" => Ok(Tier::Hobby),
            "pro" => Ok(Tier::Pro),
            "elite" => Ok(Tier::Elite),
            other => Err(GatewayError::Config(format!("Unknown tier '{}'", other))),
        }
    }
}

/// Configuration for a single provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,

    /// Base URL for the OpenAI-compatible API
    pub base_url: String,

    /// Optional environment variable for a custom base URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base_env: Option<String>,

    /// Environment variable holding the primary key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Additional environment variables, one key each
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_keys_env: Option<Vec<String>>,

    /// Environment variable holding a comma-separated key pool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_keys_env: Option<String>,

    /// Model used when no purpose-specific model is configured
    pub default_model: String,

    /// Purpose name ("fast-scoring", ...) to model
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub purpose_models: HashMap<String, String>,

    /// Ordered alternates tried on `Unavailable`, walked once
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_models: Vec<String>,

    /// Provider to fail over to when this one is exhausted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_provider: Option<String>,

    /// Minimum caller tier allowed to use this provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_tier: Option<Tier>,

    /// Parameter name mappings (e.g., max_tokens -> max_completion_tokens)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub param_mappings: HashMap<String, String>,

    /// Additional headers to send with requests
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    /// Per-request timeout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Routing and recovery policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Provider used when the caller does not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_provider: Option<String>,

    /// Provider forced by isolated mode (first local provider when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offline_provider: Option<String>,

    /// Forbid any cross-provider egress
    #[serde(default)]
    pub isolated_mode: bool,

    /// Hard ceiling on attempts per call
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Cooldown applied on rate limits without a Retry-After hint
    #[serde(default = "default_rate_limit_cooldown")]
    pub rate_limit_cooldown_secs: u64,

    /// Cooldown applied on authentication failures
    #[serde(default = "default_auth_cooldown")]
    pub auth_cooldown_secs: u64,

    /// Context size (system prompt plus messages, in characters) above which
    /// the last message is cut; 0 disables the guard
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,

    /// Characters of the last message kept when the guard trips
    #[serde(default = "default_truncated_prompt_chars")]
    pub truncated_prompt_chars: usize,
}

fn default_max_attempts() -> usize {
    6
}

fn default_rate_limit_cooldown() -> u64 {
    300
}

fn default_auth_cooldown() -> u64 {
    86_400
}

fn default_max_prompt_chars() -> usize {
    40_000
}

fn default_truncated_prompt_chars() -> usize {
    30_000
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_provider: None,
            offline_provider: None,
            isolated_mode: false,
            max_attempts: default_max_attempts(),
            rate_limit_cooldown_secs: default_rate_limit_cooldown(),
            auth_cooldown_secs: default_auth_cooldown(),
            max_prompt_chars: default_max_prompt_chars(),
            truncated_prompt_chars: default_truncated_prompt_chars(),
        }
    }
}

impl RoutingConfig {
    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_secs)
    }

    pub fn auth_cooldown(&self) -> Duration {
        Duration::from_secs(self.auth_cooldown_secs)
    }
}

impl ProviderConfig {
    /// Minimal config, mostly useful for tests and programmatic setup
    pub fn new(kind: ProviderKind, base_url: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            kind,
            base_url: base_url.into(),
            api_base_env: None,
            api_key_env: None,
            api_keys_env: None,
            pool_keys_env: None,
            default_model: default_model.into(),
            purpose_models: HashMap::new(),
            fallback_models: Vec::new(),
            fallback_provider: None,
            min_tier: None,
            param_mappings: HashMap::new(),
            headers: HashMap::new(),
            timeout_secs: None,
        }
    }

    pub fn with_fallback_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_fallback_provider(mut self, provider: impl Into<String>) -> Self {
        self.fallback_provider = Some(provider.into());
        self
    }

    pub fn with_purpose_model(mut self, purpose: Purpose, model: impl Into<String>) -> Self {
        self.purpose_models
            .insert(purpose.as_str().to_string(), model.into());
        self
    }

    pub fn with_min_tier(mut self, tier: Tier) -> Self {
        self.min_tier = Some(tier);
        self
    }

    /// Model serving `purpose` on this provider
    pub fn model_for(&self, purpose: Purpose) -> &str {
        self.purpose_models
            .get(purpose.as_str())
            .map(String::as_str)
            .unwrap_or(&self.default_model)
    }

    /// Whether `model` is one this provider is configured to serve
    pub fn serves_model(&self, model: &str) -> bool {
        self.default_model == model
            || self.purpose_models.values().any(|m| m == model)
            || self.fallback_models.iter().any(|m| m == model)
    }

    /// Get the effective base URL (from env var if configured, otherwise default)
    pub fn get_base_url(&self) -> String {
        if let Some(env_var) = &self.api_base_env {
            if let Ok(url) = std::env::var(env_var) {
                return url;
            }
        }
        self.base_url.clone()
    }

    /// All keys for this provider, primary first, without duplicates
    pub fn get_api_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        let mut push = |key: &str| {
            let key = key.trim();
            if !key.is_empty() && !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        };

        if let Some(env_var) = &self.api_key_env {
            if let Ok(key) = std::env::var(env_var) {
                push(key.as_str());
            }
        }

        for env_var in self.api_keys_env.iter().flatten() {
            if let Ok(key) = std::env::var(env_var) {
                push(key.as_str());
            }
        }

        if let Some(env_var) = &self.pool_keys_env {
            if let Ok(pool) = std::env::var(env_var) {
                pool.split(',').for_each(&mut push);
            }
        }

        keys
    }

    /// Apply parameter mappings to a request body
    pub fn apply_param_mappings(&self, params: &mut serde_json::Value) {
        if let Some(obj) = params.as_object_mut() {
            for (from, to) in &self.param_mappings {
                if let Some(value) = obj.remove(from) {
                    obj.insert(to.clone(), value);
                }
            }
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl GatewayConfig {
    /// Reject dangling provider references and impossible limits
    pub fn validate(&self) -> Result<()> {
        if self.routing.max_attempts == 0 {
            return Err(GatewayError::Config(
                "routing.max_attempts must be at least 1".to_string(),
            ));
        }

        let cooldowns = [
            ("routing.rate_limit_cooldown_secs", self.routing.rate_limit_cooldown_secs),
            ("routing.auth_cooldown_secs", self.routing.auth_cooldown_secs),
        ];
        for (field, secs) in cooldowns {
            if secs > MAX_COOLDOWN.as_secs() {
                return Err(GatewayError::Config(format!(
                    "{} must not exceed {} seconds",
                    field,
                    MAX_COOLDOWN.as_secs()
                )));
            }
        }

        if self.routing.max_prompt_chars > 0
            && self.routing.truncated_prompt_chars > self.routing.max_prompt_chars
        {
            return Err(GatewayError::Config(
                "routing.truncated_prompt_chars must not exceed routing.max_prompt_chars".to_string(),
            ));
        }

        let refs = [
            ("routing.default_provider", self.routing.default_provider.as_ref()),
            ("routing.offline_provider", self.routing.offline_provider.as_ref()),
        ];
        for (field, name) in refs {
            if let Some(name) = name {
                if !self.providers.contains_key(name) {
                    return Err(GatewayError::Config(format!(
                        "{} refers to unknown provider '{}'",
                        field, name
                    )));
                }
            }
        }

        if let Some(offline) = &self.routing.offline_provider {
            if self.providers[offline].kind != ProviderKind::Local {
                return Err(GatewayError::Config(format!(
                    "routing.offline_provider '{}' is not a local provider",
                    offline
                )));
            }
        }

        for (name, provider) in &self.providers {
            if let Some(target) = &provider.fallback_provider {
                if target == name || !self.providers.contains_key(target) {
                    return Err(GatewayError::Config(format!(
                        "provider '{}' has invalid fallback_provider '{}'",
                        name, target
                    )));
                }
            }
        }

        Ok(())
    }

    /// Provider used for default routing: configured, else first cloud, else first by name
    pub fn default_provider(&self) -> Option<&str> {
        if let Some(name) = &self.routing.default_provider {
            return Some(name);
        }
        let names = self.sorted_names();
        names
            .iter()
            .copied()
            .find(|n| self.providers[*n].kind == ProviderKind::Cloud)
            .or_else(|| names.first().copied())
    }

    /// Provider forced by isolated mode
    pub fn offline_provider(&self) -> Option<&str> {
        if let Some(name) = &self.routing.offline_provider {
            return Some(name);
        }
        self.sorted_names()
            .into_iter()
            .find(|n| self.providers[*n].kind == ProviderKind::Local)
    }

    /// Provider names in a stable order
    pub fn sorted_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
