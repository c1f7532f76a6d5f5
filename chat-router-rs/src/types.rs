//! Canonical chat data model shared by both providers.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Upstream AI provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderId {
    /// Provider A, OpenAI chat completions
    #[serde(rename = "openai")]
    OpenAi,
    /// Provider B, Anthropic messages
    #[serde(rename = "anthropic")]
    Anthropic,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "openai",
            ProviderId::Anthropic => "anthropic",
        }
    }

    /// The provider used as the fallback for this one
    pub fn other(&self) -> ProviderId {
        match self {
            ProviderId::OpenAi => ProviderId::Anthropic,
            ProviderId::Anthropic => ProviderId::OpenAi,
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "a" => Ok(ProviderId::OpenAi),
            "anthropic" | "claude" | "b" => Ok(ProviderId::Anthropic),
            other => Err(format!("unknown provider: {}", other)),
        }
    }
}

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A capability offered to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments
    pub parameters: serde_json::Value,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-issued id, preserved verbatim when present
    pub id: String,
    pub name: String,
    /// Arguments as serialized JSON
    pub arguments: String,
}

/// Provider-independent response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedResponse {
    pub message: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    pub provider: ProviderId,
}

impl NormalizedResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// What callers of the router receive: plain text when the model asked for
/// no tools, the full structured response otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChatReply {
    Text(String),
    Structured(NormalizedResponse),
}

impl ChatReply {
    /// The assistant's text, whichever shape the reply has
    pub fn text(&self) -> &str {
        match self {
            ChatReply::Text(text) => text,
            ChatReply::Structured(response) => &response.message,
        }
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            ChatReply::Text(_) => &[],
            ChatReply::Structured(response) => &response.tool_calls,
        }
    }
}

impl From<NormalizedResponse> for ChatReply {
    fn from(response: NormalizedResponse) -> Self {
        if response.has_tool_calls() {
            ChatReply::Structured(response)
        } else {
            ChatReply::Text(response.message)
        }
    }
}

/// Per-call routing options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Use this provider and disable fallback for the call
    pub force_provider: Option<ProviderId>,
    /// Deadline for each individual provider attempt
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn forced(provider: ProviderId) -> Self {
        Self {
            force_provider: Some(provider),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
