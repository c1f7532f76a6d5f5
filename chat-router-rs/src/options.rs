//! Option store and provider settings
//!
//! The router reads its configuration through `get_option(key, default)`
//! style lookups. Missing or unparsable values fall back to the default so
//! that configuration problems surface as provider errors at call time
//! (e.g. a missing API key) instead of preventing startup.

use std::collections::HashMap;
use std::env;
use std::fmt::Debug;
use std::str::FromStr;
use std::sync::RwLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::ProviderId;

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant for a membership site. Answer concisely and accurately.";

/// Key-value configuration store
pub trait OptionStore: Send + Sync {
    /// Raw value for `key`, if set
    fn get_string(&self, key: &str) -> Option<String>;
}

/// Typed lookups with defaults
pub trait OptionStoreExt: OptionStore {
    /// Parsed value for `key`, or `default` when unset or unparsable
    fn get_option<T>(&self, key: &str, default: T) -> T
    where
        T: FromStr,
        <T as FromStr>::Err: std::fmt::Display,
    {
        match self.get_string(key) {
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(value) => value,
                Err(e) => {
                    warn!(key, error = %e, "Invalid option value, using default");
                    default
                }
            },
            None => default,
        }
    }

    fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    fn get_bool_or(&self, key: &str, default: bool) -> bool {
        match self.get_string(key).map(|v| v.trim().to_lowercase()) {
            Some(v) if matches!(v.as_str(), "true" | "yes" | "1" | "on") => true,
            Some(v) if matches!(v.as_str(), "false" | "no" | "0" | "off") => false,
            _ => default,
        }
    }
}

impl<T: OptionStore + ?Sized> OptionStoreExt for T {}

/// Options read from environment variables
#[derive(Debug, Clone, Default)]
pub struct EnvOptionStore {
    prefix: Option<String>,
}

impl EnvOptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// `openai_api_key` with prefix `ASSISTANT` becomes `ASSISTANT_OPENAI_API_KEY`
    fn format_key(&self, key: &str) -> String {
        let mut env_key = String::new();

        if let Some(ref prefix) = self.prefix {
            env_key.push_str(prefix);
            env_key.push('_');
        }

        env_key.push_str(&key.to_uppercase().replace(|c: char| !c.is_ascii_alphanumeric(), "_"));
        env_key
    }
}

impl OptionStore for EnvOptionStore {
    fn get_string(&self, key: &str) -> Option<String> {
        env::var(self.format_key(key)).ok()
    }
}

/// In-memory options. Values can be changed at runtime.
#[derive(Debug, Default)]
pub struct MemoryOptionStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryOptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        let values = values.into_iter().map(|(k, v)| (k.into(), v.to_string())).collect();
        Self {
            values: RwLock::new(values),
        }
    }

    pub fn set<K, V>(&self, key: K, value: V)
    where
        K: Into<String>,
        V: ToString,
    {
        let mut values = self.values.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        values.insert(key.into(), value.to_string());
    }

    pub fn remove(&self, key: &str) {
        let mut values = self.values.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        values.remove(key);
    }
}

impl OptionStore for MemoryOptionStore {
    fn get_string(&self, key: &str) -> Option<String> {
        let values = self.values.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        values.get(key).cloned()
    }
}

/// Tries each store in order and returns the first value found
#[derive(Default)]
pub struct LayeredOptionStore {
    layers: Vec<Box<dyn OptionStore>>,
}

impl LayeredOptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layer(mut self, layer: impl OptionStore + 'static) -> Self {
        self.layers.push(Box::new(layer));
        self
    }
}

impl OptionStore for LayeredOptionStore {
    fn get_string(&self, key: &str) -> Option<String> {
        self.layers.iter().find_map(|layer| layer.get_string(key))
    }
}

/// Connection and sampling settings for one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl ProviderSettings {
    pub fn defaults_for(provider: ProviderId) -> Self {
        match provider {
            ProviderId::OpenAi => Self {
                api_key: String::new(),
                model: "gpt-4o".to_string(),
                temperature: 0.7,
                max_tokens: 2048,
                base_url: "https://api.openai.com/v1".to_string(),
                timeout_seconds: 60,
            },
            ProviderId::Anthropic => Self {
                api_key: String::new(),
                model: "claude-3-5-sonnet-20241022".to_string(),
                temperature: 0.7,
                max_tokens: 2048,
                base_url: "https://api.anthropic.com/v1".to_string(),
                timeout_seconds: 60,
            },
        }
    }

    /// Loads `{provider}_api_key`, `{provider}_model`, `{provider}_temperature`,
    /// `{provider}_max_tokens` and `{provider}_base_url`
    pub fn load<S: OptionStore + ?Sized>(
        store: &S,
        provider: ProviderId,
        timeout_seconds: u64,
    ) -> Self {
        let defaults = Self::defaults_for(provider);
        let prefix = provider.as_str();
        let key = |name: &str| format!("{}_{}", prefix, name);

        Self {
            api_key: store.get_string(&key("api_key")).unwrap_or_default().trim().to_string(),
            model: store.get_string_or(&key("model"), &defaults.model),
            temperature: store.get_option(&key("temperature"), defaults.temperature),
            max_tokens: store.get_option(&key("max_tokens"), defaults.max_tokens),
            base_url: store.get_string_or(&key("base_url"), &defaults.base_url),
            timeout_seconds,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// Everything the router needs from configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSettings {
    pub primary: ProviderId,
    pub system_prompt: String,
    pub request_timeout_seconds: u64,
    pub openai: ProviderSettings,
    pub anthropic: ProviderSettings,
}

impl ChatSettings {
    pub fn load<S: OptionStore + ?Sized>(store: &S) -> Self {
        let primary = match store.get_string("primary_api") {
            Some(raw) => raw.parse::<ProviderId>().unwrap_or_else(|e| {
                warn!(error = %e, "Invalid primary_api option, using openai");
                ProviderId::OpenAi
            }),
            None => ProviderId::OpenAi,
        };
        let request_timeout_seconds = store.get_option("request_timeout_seconds", 60u64).max(1);

        Self {
            primary,
            system_prompt: store.get_string_or("system_prompt", DEFAULT_SYSTEM_PROMPT),
            request_timeout_seconds,
            openai: ProviderSettings::load(store, ProviderId::OpenAi, request_timeout_seconds),
            anthropic: ProviderSettings::load(
                store,
                ProviderId::Anthropic,
                request_timeout_seconds,
            ),
        }
    }

    pub fn provider(&self, provider: ProviderId) -> &ProviderSettings {
        match provider {
            ProviderId::OpenAi => &self.openai,
            ProviderId::Anthropic => &self.anthropic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_option_store() {
        let store = MemoryOptionStore::with_values([("openai_max_tokens", "512"), ("flag", "yes")]);

        assert_eq!(store.get_option("openai_max_tokens", 0u32), 512);
        assert_eq!(store.get_option("missing", 7u32), 7);
        assert!(store.get_bool_or("flag", false));

        store.set("openai_max_tokens", "not a number");
        assert_eq!(store.get_option("openai_max_tokens", 99u32), 99);
    }

    #[test]
    fn test_env_key_format() {
        let store = EnvOptionStore::new().with_prefix("ASSISTANT");
        assert_eq!(store.format_key("openai_api_key"), "ASSISTANT_OPENAI_API_KEY");
        assert_eq!(store.format_key("primary-api"), "ASSISTANT_PRIMARY_API");
    }

    #[test]
    fn test_layered_store_prefers_first_layer() {
        let store = LayeredOptionStore::new()
            .with_layer(MemoryOptionStore::with_values([("openai_model", "gpt-4o-mini")]))
            .with_layer(MemoryOptionStore::with_values([
                ("openai_model", "gpt-4"),
                ("anthropic_model", "claude"),
            ]));

        assert_eq!(store.get_string("openai_model").as_deref(), Some("gpt-4o-mini"));
        assert_eq!(store.get_string("anthropic_model").as_deref(), Some("claude"));
        assert_eq!(store.get_string("nothing"), None);
    }

    #[test]
    fn test_chat_settings_defaults() {
        let settings = ChatSettings::load(&MemoryOptionStore::new());

        assert_eq!(settings.primary, ProviderId::OpenAi);
        assert_eq!(settings.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert!(!settings.openai.has_credentials());
        assert_eq!(settings.anthropic.base_url, "https://api.anthropic.com/v1");
        assert_eq!(settings.openai.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_chat_settings_from_options() {
        let store = MemoryOptionStore::with_values([
            ("primary_api", "anthropic"),
            ("anthropic_api_key", " sk-ant-test "),
            ("anthropic_temperature", "0.2"),
            ("request_timeout_seconds", "30"),
        ]);
        let settings = ChatSettings::load(&store);

        assert_eq!(settings.primary, ProviderId::Anthropic);
        assert_eq!(settings.anthropic.api_key, "sk-ant-test");
        assert_eq!(settings.anthropic.temperature, 0.2);
        assert_eq!(settings.provider(ProviderId::Anthropic).timeout_seconds, 30);
        assert_eq!(settings.openai.timeout_seconds, 30);
    }

    #[test]
    fn test_invalid_primary_falls_back_to_openai() {
        let store = MemoryOptionStore::with_values([("primary_api", "gemini")]);
        assert_eq!(ChatSettings::load(&store).primary, ProviderId::OpenAi);
    }
}
