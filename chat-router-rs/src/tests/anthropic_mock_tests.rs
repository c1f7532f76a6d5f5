//! Mock tests for the Anthropic provider

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::error::ProviderError;
    use crate::options::ProviderSettings;
    use crate::providers::{AnthropicProvider, ChatProvider};
    use crate::types::{Message, ProviderId, ToolSpec};

    fn create_test_provider(mock_server: &MockServer) -> AnthropicProvider {
        let settings = ProviderSettings {
            api_key: "mock_anthropic_key".to_string(),
            base_url: format!("{}/v1", mock_server.uri()),
            timeout_seconds: 5,
            ..ProviderSettings::defaults_for(ProviderId::Anthropic)
        };
        AnthropicProvider::new(settings).expect("Failed to build Anthropic provider")
    }

    #[tokio::test]
    async fn test_messages_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "mock_anthropic_key"))
            .and(header("anthropic-version", "2023-06-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_mock1",
                "type": "message",
                "role": "assistant",
                "model": "claude-3-5-sonnet-20241022",
                "content": [{"type": "text", "text": "Hi! What can I do for you?"}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 12, "output_tokens": 9}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = create_test_provider(&mock_server);
        let response = provider
            .send(&[Message::system("You are a site assistant"), Message::user("Hello")], &[])
            .await
            .unwrap();

        assert_eq!(response.message, "Hi! What can I do for you?");
        assert_eq!(response.provider, ProviderId::Anthropic);

        let requests = mock_server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["system"], "You are a site assistant");
        assert_eq!(body["messages"], json!([{"role": "user", "content": "Hello"}]));
        assert_eq!(body["max_tokens"], 2048);
        assert_eq!(body["model"], "claude-3-5-sonnet-20241022");
    }

    #[tokio::test]
    async fn test_tool_use_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_mock2",
                "content": [
                    {"type": "text", "text": "Looking that up."},
                    {
                        "type": "tool_use",
                        "id": "toolu_mock",
                        "name": "get_order",
                        "input": {"order_id": 42}
                    }
                ],
                "stop_reason": "tool_use"
            })))
            .mount(&mock_server)
            .await;

        let tool = ToolSpec {
            name: "get_order".to_string(),
            description: "Fetch an order".to_string(),
            parameters: json!({"type": "object", "properties": {"order_id": {"type": "integer"}}}),
        };

        let provider = create_test_provider(&mock_server);
        let response = provider
            .send(&[Message::user("where is order 42?")], &[tool])
            .await
            .unwrap();

        assert_eq!(response.message, "Looking that up.");
        assert_eq!(response.tool_calls[0].id, "toolu_mock");
        assert_eq!(response.tool_calls[0].arguments, "{\"order_id\":42}");

        let requests = mock_server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["tools"][0]["name"], "get_order");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
    }

    #[tokio::test]
    async fn test_overloaded_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(529).set_body_json(json!({
                "type": "error",
                "error": {"type": "overloaded_error", "message": "Overloaded"}
            })))
            .mount(&mock_server)
            .await;

        let provider = create_test_provider(&mock_server);
        let error = provider.send(&[Message::user("Hello")], &[]).await.unwrap_err();

        assert_eq!(
            error,
            ProviderError::Server {
                status: 529,
                message: "Overloaded".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_key_makes_no_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let settings = ProviderSettings {
            base_url: mock_server.uri(),
            ..ProviderSettings::defaults_for(ProviderId::Anthropic)
        };
        let provider = AnthropicProvider::new(settings).unwrap();
        let error = provider.send(&[Message::user("Hello")], &[]).await.unwrap_err();

        assert_eq!(error.code(), "missing_api_key");
    }

    #[tokio::test]
    async fn test_assistant_first_conversation_makes_no_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let provider = create_test_provider(&mock_server);
        let error = provider
            .send(&[Message::assistant("How can I help?"), Message::user("Hello")], &[])
            .await
            .unwrap_err();

        assert_eq!(error.code(), "client_error");
        assert!(!error.is_retryable());
    }
}
