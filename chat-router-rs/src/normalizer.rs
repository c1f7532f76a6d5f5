//! Converts provider responses into `NormalizedResponse`.
//!
//! Text and tool calls are extracted the same way for both providers so the
//! router's callers never see a provider-specific shape. Tool call ids are
//! preserved verbatim; one is generated only when the provider omitted it.

use uuid::Uuid;

use crate::error::{ProviderError, Result};
use crate::providers::anthropic::{ContentBlock, MessagesResponse};
use crate::providers::openai::ChatCompletionResponse;
use crate::types::{NormalizedResponse, ProviderId, ToolCall};

pub fn from_openai(response: ChatCompletionResponse) -> Result<NormalizedResponse> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| {
            ProviderError::InvalidResponse("OpenAI response has no choices".to_string())
        })?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| ToolCall {
            id: call
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple())),
            name: call.function.name,
            arguments: if call.function.arguments.trim().is_empty() {
                "{}".to_string()
            } else {
                call.function.arguments
            },
        })
        .collect();

    Ok(NormalizedResponse {
        message: choice.message.content.unwrap_or_default(),
        tool_calls,
        provider: ProviderId::OpenAi,
    })
}

pub fn from_anthropic(response: MessagesResponse) -> Result<NormalizedResponse> {
    let mut texts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();

    for block in response.content {
        match block {
            ContentBlock::Text { text } => texts.push(text),
            ContentBlock::ToolUse { id, name, input } => {
                let input = if input.is_null() { serde_json::json!({}) } else { input };
                tool_calls.push(ToolCall {
                    id: id
                        .filter(|id| !id.is_empty())
                        .unwrap_or_else(|| format!("toolu_{}", Uuid::new_v4().simple())),
                    name,
                    arguments: serde_json::to_string(&input)?,
                });
            }
            ContentBlock::Unsupported => {}
        }
    }

    if texts.is_empty() && tool_calls.is_empty() {
        return Err(ProviderError::InvalidResponse(
            "Anthropic response has no text or tool use content".to_string(),
        ));
    }

    Ok(NormalizedResponse {
        message: texts.join("\n"),
        tool_calls,
        provider: ProviderId::Anthropic,
    })
}
