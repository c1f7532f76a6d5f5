//! Provider B: Anthropic messages client

mod models;
pub use models::*;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::mapping::map_http_error;
use crate::error::{ProviderError, Result};
use crate::normalizer;
use crate::options::ProviderSettings;
use crate::providers::{check_request, endpoint, http_client_for, ChatProvider};
use crate::types::{Message, NormalizedResponse, ProviderId, Role, ToolSpec};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    http_client: Client,
    settings: ProviderSettings,
}

impl AnthropicProvider {
    pub fn new(settings: ProviderSettings) -> Result<Self> {
        let http_client = http_client_for(ProviderId::Anthropic, &settings)?;
        Ok(Self { http_client, settings })
    }

    /// Translates canonical messages and tools into a request body.
    ///
    /// System messages are joined into the top-level `system` field and
    /// consecutive turns with the same role are merged, since the API
    /// requires alternating roles starting with a user turn. A conversation
    /// made only of system messages is sent as a single user turn.
    pub fn build_request(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<MessagesRequest> {
        let mut system: Option<String> = None;
        let mut turns: Vec<AnthropicMessage> = Vec::new();

        for message in messages {
            match message.role {
                Role::System => match system {
                    Some(ref mut existing) => {
                        existing.push_str("\n\n");
                        existing.push_str(&message.content);
                    }
                    None => system = Some(message.content.clone()),
                },
                Role::User | Role::Assistant => {
                    let role = message.role.as_str();
                    match turns.last_mut() {
                        Some(last) if last.role == role => {
                            last.content.push_str("\n\n");
                            last.content.push_str(&message.content);
                        }
                        _ => turns.push(AnthropicMessage {
                            role: role.to_string(),
                            content: message.content.clone(),
                        }),
                    }
                }
            }
        }

        match turns.first() {
            None => match system.take() {
                Some(content) => turns.push(AnthropicMessage {
                    role: Role::User.as_str().to_string(),
                    content,
                }),
                None => return Err(ProviderError::Internal("no messages to send".to_string())),
            },
            Some(first) if first.role != Role::User.as_str() => {
                return Err(ProviderError::Internal(
                    "conversation must start with a user turn".to_string(),
                ));
            }
            Some(_) => {}
        }

        Ok(MessagesRequest {
            model: self.settings.model.clone(),
            max_tokens: self.settings.max_tokens,
            temperature: Some(self.settings.temperature),
            system,
            messages: turns,
            tools: tools
                .iter()
                .map(|tool| AnthropicTool {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    input_schema: tool.parameters.clone(),
                })
                .collect(),
        })
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    fn model(&self) -> &str {
        &self.settings.model
    }

    async fn send(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<NormalizedResponse> {
        check_request(ProviderId::Anthropic, &self.settings, messages)?;

        let url = endpoint(&self.settings.base_url, "messages")?;
        let request = self.build_request(messages, tools)?;

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending Anthropic request"
        );

        let response = self
            .http_client
            .post(url)
            .header("x-api-key", &self.settings.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(map_http_error(status, &headers, &body));
        }

        let parsed: MessagesResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::InvalidResponse(format!("Anthropic response: {}", e)))?;

        normalizer::from_anthropic(parsed)
    }
}
