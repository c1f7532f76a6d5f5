//! # API Router
//!
//! Sends a chat request to the primary provider and, when that fails, hands
//! the failure to the `RecoveryService` together with a retry action (the
//! same provider again) and a fallback action (the other provider).
//!
//! Every provider attempt is self-contained: it checks the provider's
//! breaker, runs the call under the request deadline, converts a panic into
//! an error, and classifies any failure so it is counted against that
//! provider. An attempt against an open breaker makes no call and is not
//! counted.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use futures::FutureExt;
use recovery_rs::{ErrorType, RecoveryAction, RecoveryFuture, RecoveryService, StructuredError};
use tracing::{debug, info, warn};

use crate::error::{circuit_open_error, classify, exception_error, ProviderError};
use crate::options::{ChatSettings, OptionStore};
use crate::providers::{ChatProvider, HttpProviderFactory, ProviderFactory};
use crate::types::{ChatReply, Message, NormalizedResponse, ProviderId, RequestOptions, ToolSpec};

/// Component name for failures raised by the router itself
pub const ROUTER_COMPONENT: &str = "router";

pub struct ApiRouter {
    options: Arc<dyn OptionStore>,
    recovery: Arc<RecoveryService>,
    factory: Arc<dyn ProviderFactory>,
    settings: RwLock<ChatSettings>,
    clients: Mutex<HashMap<ProviderId, Arc<dyn ChatProvider>>>,
}

impl ApiRouter {
    /// Router talking to the real provider HTTP APIs
    pub fn new(options: Arc<dyn OptionStore>, recovery: Arc<RecoveryService>) -> Self {
        Self::with_factory(options, recovery, Arc::new(HttpProviderFactory))
    }

    pub fn with_factory(
        options: Arc<dyn OptionStore>,
        recovery: Arc<RecoveryService>,
        factory: Arc<dyn ProviderFactory>,
    ) -> Self {
        let settings = ChatSettings::load(options.as_ref());
        info!(primary = %settings.primary, "API router initialized");

        Self {
            options,
            recovery,
            factory,
            settings: RwLock::new(settings),
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn recovery(&self) -> &Arc<RecoveryService> {
        &self.recovery
    }

    /// Snapshot of the current settings
    pub fn settings(&self) -> ChatSettings {
        self.settings.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn primary_provider(&self) -> ProviderId {
        self.settings.read().unwrap_or_else(PoisonError::into_inner).primary
    }

    /// Drops cached provider clients and re-reads settings from the option
    /// store, so changed keys or models apply to the next request.
    pub fn reset_state(&self) {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner).clear();

        let settings = ChatSettings::load(self.options.as_ref());
        info!(primary = %settings.primary, "Router state reset");
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    /// Routes a chat request. Replies without tool calls collapse to text.
    pub async fn process_request(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolSpec>,
        options: RequestOptions,
    ) -> Result<ChatReply, StructuredError> {
        self.dispatch(messages, tools, options).await.map(ChatReply::from)
    }

    /// Routes a chat request and returns the normalized response.
    ///
    /// Forcing a provider disables fallback for this call; retries of the
    /// forced provider still follow the `api` strategy.
    pub async fn dispatch(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolSpec>,
        options: RequestOptions,
    ) -> Result<NormalizedResponse, StructuredError> {
        if messages.is_empty() {
            return Err(self.recovery.create_error(
                ErrorType::Validation,
                "empty_messages",
                "A chat request needs at least one message",
                ROUTER_COMPONENT,
            ));
        }

        let (primary, timeout) = {
            let settings = self.settings.read().unwrap_or_else(PoisonError::into_inner);
            (
                options.force_provider.unwrap_or(settings.primary),
                options
                    .timeout
                    .unwrap_or_else(|| Duration::from_secs(settings.request_timeout_seconds)),
            )
        };

        let messages: Arc<[Message]> = messages.into();
        let tools: Arc<[ToolSpec]> = tools.into();

        debug!(
            provider = %primary,
            forced = options.force_provider.is_some(),
            messages = messages.len(),
            tools = tools.len(),
            "Dispatching chat request"
        );

        let outcome = self.attempt(primary, messages.clone(), tools.clone(), timeout).await;

        let retry: RecoveryAction<'_, NormalizedResponse> = {
            let messages = messages.clone();
            let tools = tools.clone();
            Box::new(move || self.attempt(primary, messages.clone(), tools.clone(), timeout))
        };

        let fallback: Option<RecoveryAction<'_, NormalizedResponse>> =
            match options.force_provider {
                Some(_) => None,
                None => Some(Box::new(move || {
                    let secondary = primary.other();
                    info!(from = %primary, to = %secondary, "Falling back to secondary provider");
                    self.attempt(secondary, messages.clone(), tools.clone(), timeout)
                })),
            };

        self.recovery
            .recover(outcome, primary.as_str(), Some(retry), fallback)
            .await
    }

    /// One call to `provider`. Never retries.
    fn attempt(
        &self,
        provider: ProviderId,
        messages: Arc<[Message]>,
        tools: Arc<[ToolSpec]>,
        timeout: Duration,
    ) -> RecoveryFuture<'_, NormalizedResponse> {
        async move {
            if self.recovery.is_open(&ErrorType::Api, provider.as_str()) {
                debug!(provider = %provider, "Circuit open, not calling provider");
                return Err(circuit_open_error(provider));
            }

            let client = self.client(provider)?;
            let call = AssertUnwindSafe(client.send(&messages, &tools)).catch_unwind();

            match tokio::time::timeout(timeout, call).await {
                Ok(Ok(Ok(response))) => {
                    debug!(
                        provider = %provider,
                        tool_calls = response.tool_calls.len(),
                        "Provider call succeeded"
                    );
                    Ok(response)
                }
                Ok(Ok(Err(error))) => Err(classify(&self.recovery, provider, &error)),
                Ok(Err(panic)) => {
                    let detail = panic_detail(panic.as_ref());
                    warn!(provider = %provider, detail = %detail, "Provider call panicked");
                    Err(exception_error(&self.recovery, provider, &detail))
                }
                Err(_) => {
                    let error = ProviderError::Timeout(format!(
                        "no response within {}s",
                        timeout.as_secs_f64()
                    ));
                    Err(classify(&self.recovery, provider, &error))
                }
            }
        }
        .boxed()
    }

    /// Cached client for `provider`, built on first use
    fn client(&self, provider: ProviderId) -> Result<Arc<dyn ChatProvider>, StructuredError> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(&provider) {
            return Ok(client.clone());
        }

        let settings = self.settings.read().unwrap_or_else(PoisonError::into_inner);
        let client = self
            .factory
            .create(provider, &settings)
            .map_err(|error| classify(&self.recovery, provider, &error))?;

        debug!(provider = %provider, model = %client.model(), "Created provider client");
        clients.insert(provider, client.clone());
        Ok(client)
    }
}

fn panic_detail(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}
