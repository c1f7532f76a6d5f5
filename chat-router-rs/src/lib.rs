//! # Chat Router
//!
//! Provider-agnostic chat routing for the site assistant:
//!
//! - Canonical messages, tool specs and normalized responses
//! - HTTP clients for the two upstream providers (OpenAI and Anthropic)
//! - `ApiRouter`, which sends each request to the primary provider and
//!   recovers from failures through a shared `recovery_rs::RecoveryService`
//! - `ChatService::process_chat`, the single entry point for a chat turn
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use chat_router_rs::{ApiRouter, ChatService, EnvOptionStore};
//! use recovery_rs::RecoveryService;
//!
//! # async fn run() {
//! let options = Arc::new(EnvOptionStore::new().with_prefix("ASSISTANT"));
//! let recovery = Arc::new(RecoveryService::new());
//! let router = Arc::new(ApiRouter::new(options, recovery));
//!
//! let outcome = ChatService::new(router).process_chat("What's new on the blog?").await;
//! println!("{}", outcome.message);
//! # }
//! ```

pub mod chat;
pub mod error;
pub mod normalizer;
pub mod options;
pub mod providers;
pub mod router;
pub mod types;

pub use chat::{ChatOutcome, ChatService};
pub use error::{ProviderError, Result};
pub use options::{
    ChatSettings, EnvOptionStore, LayeredOptionStore, MemoryOptionStore, OptionStore,
    OptionStoreExt, ProviderSettings,
};
pub use providers::{ChatProvider, HttpProviderFactory, ProviderFactory};
pub use router::ApiRouter;
pub use types::{
    ChatReply, Message, NormalizedResponse, ProviderId, RequestOptions, Role, ToolCall, ToolSpec,
};

#[cfg(test)]
mod tests;
