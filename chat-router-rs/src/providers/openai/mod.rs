//! Provider A: OpenAI chat completions client

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
use crate::types::{Message, NormalizedResponse, ProviderId, ToolSpec};

pub struct OpenAiProvider {
    http_client: Client,
    settings: ProviderSettings,
}

impl OpenAiProvider {
    pub fn new(settings: ProviderSettings) -> Result<Self> {
        let http_client = http_client_for(ProviderId::OpenAi, &settings)?;
        Ok(Self { http_client, settings })
    }

    /// Translates canonical messages and tools into a request body
    pub fn build_request(&self, messages: &[Message], tools: &[ToolSpec]) -> ChatCompletionRequest {
        let tools: Vec<Tool> = tools
            .iter()
            .map(|tool| Tool {
                tool_type: "function".to_string(),
                function: FunctionDefinition {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                },
            })
            .collect();

        ChatCompletionRequest {
            model: self.settings.model.clone(),
            messages: messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: Some(self.settings.temperature),
            max_tokens: Some(self.settings.max_tokens),
            tool_choice: if tools.is_empty() { None } else { Some("auto".to_string()) },
            tools,
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenAi
    }

    fn model(&self) -> &str {
        &self.settings.model
    }

    async fn send(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<NormalizedResponse> {
        check_request(ProviderId::OpenAi, &self.settings, messages)?;

        let url = endpoint(&self.settings.base_url, "chat/completions")?;
        let request = self.build_request(messages, tools);

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending OpenAI request"
        );

        let response = self
            .http_client
            .post(url)
            .bearer_auth(&self.settings.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(map_http_error(status, &headers, &body));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::InvalidResponse(format!("OpenAI response: {}", e)))?;

        normalizer::from_openai(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> OpenAiProvider {
        let settings = ProviderSettings {
            api_key: "sk-test".to_string(),
            ..ProviderSettings::defaults_for(ProviderId::OpenAi)
        };
        OpenAiProvider::new(settings).unwrap()
    }

    #[test]
    fn test_build_request_without_tools() {
        let request =
            provider().build_request(&[Message::system("be brief"), Message::user("hi")], &[]);
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0], json!({"role": "system", "content": "be brief"}));
        assert_eq!(body["max_tokens"], 2048);
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn test_build_request_formats_tools_as_functions() {
        let tool = ToolSpec {
            name: "get_member".to_string(),
            description: "Look up a member".to_string(),
            parameters: json!({"type": "object", "properties": {"id": {"type": "integer"}}}),
        };
        let request = provider().build_request(&[Message::user("who is 7?")], &[tool]);
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "get_member");
        assert_eq!(body["tools"][0]["function"]["parameters"]["type"], "object");
        assert_eq!(body["tool_choice"], "auto");
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_io() {
        let settings = ProviderSettings::defaults_for(ProviderId::OpenAi);
        let provider = OpenAiProvider::new(settings).unwrap();
        let result = provider.send(&[Message::user("hi")], &[]).await;
        assert_eq!(
            result,
            Err(ProviderError::MissingCredential {
                provider: ProviderId::OpenAi
            })
        );
    }
}
