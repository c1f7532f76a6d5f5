//! Provider clients
//!
//! A provider client performs exactly one upstream call per `send`. It owns
//! the translation of the canonical `(messages, tools)` pair into its wire
//! format and of the wire response back into a `NormalizedResponse`.
//! Retrying is never done here; that is the recovery service's job.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use url::Url;

use crate::error::{ProviderError, Result};
use crate::options::{ChatSettings, ProviderSettings};
use crate::types::{Message, NormalizedResponse, ProviderId, ToolSpec};

pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

/// One upstream AI chat service
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    fn model(&self) -> &str;

    /// Sends one chat request. `messages` must be non-empty.
    async fn send(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<NormalizedResponse>;
}

/// Builds provider clients from settings. The router caches what it returns
/// until its state is reset.
pub trait ProviderFactory: Send + Sync {
    fn create(
        &self,
        provider: ProviderId,
        settings: &ChatSettings,
    ) -> Result<Arc<dyn ChatProvider>>;
}

/// Factory for the real HTTP clients
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpProviderFactory;

impl ProviderFactory for HttpProviderFactory {
    fn create(
        &self,
        provider: ProviderId,
        settings: &ChatSettings,
    ) -> Result<Arc<dyn ChatProvider>> {
        let provider_settings = settings.provider(provider).clone();
        let client: Arc<dyn ChatProvider> = match provider {
            ProviderId::OpenAi => Arc::new(OpenAiProvider::new(provider_settings)?),
            ProviderId::Anthropic => Arc::new(AnthropicProvider::new(provider_settings)?),
        };
        Ok(client)
    }
}

/// User agent sent with every provider request
#[derive(Debug, Clone)]
pub struct UserAgent {
    pub app_name: String,
    pub version: String,
    pub extra: Option<String>,
}

impl Default for UserAgent {
    fn default() -> Self {
        Self {
            app_name: "assistant-chat-router".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            extra: None,
        }
    }
}

impl fmt::Display for UserAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app_name, self.version)?;
        if let Some(ref extra) = self.extra {
            write!(f, " ({})", extra)?;
        }
        Ok(())
    }
}

/// Build a standard HTTP client with the given user agent and timeout
pub fn build_http_client(
    user_agent: Option<UserAgent>,
    timeout: Option<Duration>,
) -> Result<Client> {
    let mut headers = header::HeaderMap::new();
    let ua = user_agent.unwrap_or_default().to_string();

    headers.insert(
        header::USER_AGENT,
        header::HeaderValue::from_str(&ua)
            .map_err(|e| ProviderError::Internal(format!("Invalid user agent: {}", e)))?,
    );

    Client::builder()
        .default_headers(headers)
        .timeout(timeout.unwrap_or_else(|| Duration::from_secs(60)))
        .gzip(true)
        .build()
        .map_err(|e| ProviderError::Internal(format!("Failed to build HTTP client: {}", e)))
}

/// Joins `path` onto `base_url`, keeping any path prefix of the base
/// (`https://host/v1` + `messages` gives `https://host/v1/messages`)
pub fn endpoint(base_url: &str, path: &str) -> Result<Url> {
    let mut base = Url::parse(base_url.trim())
        .map_err(|e| ProviderError::Internal(format!("Invalid base URL '{}': {}", base_url, e)))?;

    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }

    base.join(path.trim_start_matches('/'))
        .map_err(|e| ProviderError::Internal(format!("Invalid endpoint path '{}': {}", path, e)))
}

/// Shared construction for both HTTP providers
pub(crate) fn http_client_for(provider: ProviderId, settings: &ProviderSettings) -> Result<Client> {
    build_http_client(
        Some(UserAgent {
            extra: Some(provider.as_str().to_string()),
            ..UserAgent::default()
        }),
        Some(settings.timeout()),
    )
}

/// Fails fast when the provider has no API key or no messages to send
pub(crate) fn check_request(
    provider: ProviderId,
    settings: &ProviderSettings,
    messages: &[Message],
) -> Result<()> {
    if !settings.has_credentials() {
        return Err(ProviderError::MissingCredential { provider });
    }
    if messages.is_empty() {
        return Err(ProviderError::Internal("no messages to send".to_string()));
    }
    Ok(())
}
