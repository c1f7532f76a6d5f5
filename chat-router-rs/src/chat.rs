//! Chat entry point used by the hosting application

use std::sync::Arc;

use recovery_rs::display::sanitize_error;
use recovery_rs::logging::{current_correlation_id, new_correlation_id, scope_correlation_id};
use recovery_rs::{format_for_display, DisplayOptions, ErrorType, StructuredError};
use serde::Serialize;
use tracing::{error, info};

use crate::router::{ApiRouter, ROUTER_COMPONENT};
use crate::types::{ChatReply, Message, RequestOptions};

/// Result of one chat turn, always well-formed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatOutcome {
    pub success: bool,
    /// Reply text, or a user-facing explanation of the failure
    pub message: String,
    /// JSON of the reply on success, of the sanitized error on failure
    pub raw_response: String,
}

pub struct ChatService {
    router: Arc<ApiRouter>,
    display: DisplayOptions,
}

impl ChatService {
    pub fn new(router: Arc<ApiRouter>) -> Self {
        Self {
            router,
            display: DisplayOptions::default(),
        }
    }

    /// Show error ids, codes and sanitized messages in failures.
    /// Only enable for privileged users.
    pub fn with_technical_details(mut self, enabled: bool) -> Self {
        self.display.include_technical = enabled;
        self
    }

    pub fn router(&self) -> &Arc<ApiRouter> {
        &self.router
    }

    /// Runs one chat turn under the caller's correlation id, or a fresh one
    /// when none is set. Every error raised during the turn carries that id.
    pub async fn process_chat(&self, message: &str) -> ChatOutcome {
        let correlation_id = current_correlation_id().unwrap_or_else(new_correlation_id);
        scope_correlation_id(correlation_id, self.process_turn(message)).await
    }

    async fn process_turn(&self, message: &str) -> ChatOutcome {
        let message = message.trim();
        if message.is_empty() {
            let error = self.router.recovery().create_error(
                ErrorType::Validation,
                "empty_message",
                "Chat message is empty",
                ROUTER_COMPONENT,
            );
            return self.failure(&error);
        }

        let system_prompt = self.router.settings().system_prompt;
        let messages = vec![Message::system(system_prompt), Message::user(message)];

        match self
            .router
            .process_request(messages, Vec::new(), RequestOptions::default())
            .await
        {
            Ok(reply) => {
                info!(
                    structured = matches!(reply, ChatReply::Structured(_)),
                    "Chat turn completed"
                );
                ChatOutcome {
                    success: true,
                    message: reply.text().to_string(),
                    raw_response: to_json(&reply),
                }
            }
            Err(error) => self.failure(&error),
        }
    }

    fn failure(&self, error: &StructuredError) -> ChatOutcome {
        error!(error_id = %error.id, code = %error.code, "Chat turn failed");
        ChatOutcome {
            success: false,
            message: format_for_display(error, self.display),
            raw_response: to_json(&sanitize_error(error)),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|e| format!("{{\"serialization_error\":\"{}\"}}", e))
}
