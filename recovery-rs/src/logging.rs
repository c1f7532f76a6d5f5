//! # Structured Logging
//!
//! Subscriber setup for the assistant and correlation id tracking for the
//! request currently being handled.
//!
//! A correlation id scoped to a tokio task with [`scope_correlation_id`]
//! follows the task across worker threads and takes precedence over the
//! thread-level id set with [`set_correlation_id`].

use std::cell::RefCell;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};
use uuid::Uuid;

use crate::types::{ErrorType, Severity, StructuredError};

thread_local! {
    static CORRELATION_ID: RefCell<Option<String>> = RefCell::new(None);
}

tokio::task_local! {
    static TASK_CORRELATION_ID: String;
}

static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Configuration for the logging system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    pub service_name: String,
    pub file_output: bool,
    pub log_dir: Option<String>,
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            service_name: "assistant-service".to_string(),
            file_output: false,
            log_dir: None,
            json_format: false,
        }
    }
}

/// Installs the global tracing subscriber. Calling it again is a no-op.
pub fn init_logging(config: Option<LoggingConfig>) -> Result<(), StructuredError> {
    if LOGGING_INITIALIZED.load(Ordering::SeqCst) {
        return Ok(());
    }

    let config = config.unwrap_or_default();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},hyper=warn,reqwest=warn", config.level)));

    let subscriber = Registry::default().with(filter);

    // JSON and text layers have different concrete types, so each branch
    // finishes building its own subscriber.
    let result = if config.json_format {
        let json_layer = fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_target(true);
        let subscriber = subscriber.with(json_layer);
        match file_layer(&config) {
            Some(file) => tracing::subscriber::set_global_default(subscriber.with(file)),
            None => tracing::subscriber::set_global_default(subscriber),
        }
    } else {
        let text_layer = fmt::layer().with_target(true).with_thread_ids(true);
        let subscriber = subscriber.with(text_layer);
        match file_layer(&config) {
            Some(file) => tracing::subscriber::set_global_default(subscriber.with(file)),
            None => tracing::subscriber::set_global_default(subscriber),
        }
    };

    result.map_err(|e| {
        StructuredError::new(
            ErrorType::System,
            "logging_init_failed",
            format!("Failed to set global subscriber: {}", e),
        )
        .severity(Severity::Critical)
    })?;

    LOGGING_INITIALIZED.store(true, Ordering::SeqCst);

    tracing::info!(
        service = %config.service_name,
        level = %config.level,
        json = config.json_format,
        "Structured logging initialized"
    );

    Ok(())
}

type FileLayer<S> = fmt::Layer<S, fmt::format::DefaultFields, fmt::format::Format, NonBlocking>;

fn file_layer<S>(config: &LoggingConfig) -> Option<FileLayer<S>>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    if !config.file_output {
        return None;
    }
    let log_dir = config.log_dir.as_ref()?;

    let appender = RollingFileAppender::new(
        tracing_appender::rolling::Rotation::DAILY,
        log_dir,
        format!("{}.log", config.service_name),
    );
    let (non_blocking, guard) = NonBlocking::new(appender);

    // The writer flushes on guard drop; keep it for the life of the process.
    Box::leak(Box::new(guard));

    Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
}

/// Sets the correlation id for the current thread
pub fn set_correlation_id<S: Into<String>>(correlation_id: S) {
    CORRELATION_ID.with(|id| *id.borrow_mut() = Some(correlation_id.into()));
}

pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generates and sets a new correlation id for the current thread
pub fn generate_correlation_id() -> String {
    let id = new_correlation_id();
    set_correlation_id(id.clone());
    id
}

pub fn current_correlation_id() -> Option<String> {
    TASK_CORRELATION_ID
        .try_with(|id| id.clone())
        .ok()
        .or_else(|| CORRELATION_ID.with(|id| id.borrow().clone()))
}

pub fn clear_correlation_id() {
    CORRELATION_ID.with(|id| *id.borrow_mut() = None);
}

/// Runs `f` with `correlation_id` set, restoring the previous id afterwards
pub fn with_correlation_id<F, R, S>(correlation_id: S, f: F) -> R
where
    F: FnOnce() -> R,
    S: Into<String>,
{
    TASK_CORRELATION_ID.sync_scope(correlation_id.into(), f)
}

/// Drives `fut` with `correlation_id` as the current id on every poll,
/// whichever worker thread runs it
pub async fn scope_correlation_id<F, S>(correlation_id: S, fut: F) -> F::Output
where
    F: Future,
    S: Into<String>,
{
    TASK_CORRELATION_ID.scope(correlation_id.into(), fut).await
}

/// Logs an error at the level its severity calls for
pub fn log_structured_error(error: &StructuredError) {
    use tracing::{error, info, warn};

    let correlation_id = error.correlation_id.as_deref().unwrap_or("unknown");
    let component = error.component().unwrap_or("unknown");

    match error.severity {
        Severity::Critical => {
            error!(
                error_id = %error.id,
                error_type = %error.error_type,
                correlation_id = %correlation_id,
                component = %component,
                code = %error.code,
                severity = %error.severity,
                timestamp = %error.timestamp,
                context = ?error.context,
                "{}",
                error.message
            );
        }
        Severity::Error => {
            error!(
                error_id = %error.id,
                error_type = %error.error_type,
                correlation_id = %correlation_id,
                component = %component,
                code = %error.code,
                severity = %error.severity,
                "{}",
                error.message
            );
        }
        Severity::Warning => {
            warn!(
                error_id = %error.id,
                error_type = %error.error_type,
                correlation_id = %correlation_id,
                component = %component,
                code = %error.code,
                "{}",
                error.message
            );
        }
        Severity::Info => {
            info!(
                error_id = %error.id,
                error_type = %error.error_type,
                component = %component,
                code = %error.code,
                "{}",
                error.message
            );
        }
    }
}

impl TryFrom<config::Config> for LoggingConfig {
    type Error = config::ConfigError;

    fn try_from(cfg: config::Config) -> Result<Self, Self::Error> {
        let mut base = LoggingConfig::default();

        if let Ok(level) = cfg.get::<String>("logging.level") {
            base.level = level;
        }
        if let Ok(service_name) = cfg.get::<String>("logging.service_name") {
            base.service_name = service_name;
        }
        if let Ok(file_output) = cfg.get::<bool>("logging.file_output") {
            base.file_output = file_output;
        }
        if let Ok(log_dir) = cfg.get::<String>("logging.log_dir") {
            base.log_dir = Some(log_dir);
        }
        if let Ok(json_format) = cfg.get::<bool>("logging.json_format") {
            base.json_format = json_format;
        }

        Ok(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_id() {
        clear_correlation_id();
        assert!(current_correlation_id().is_none());

        set_correlation_id("request-1");
        assert_eq!(current_correlation_id(), Some("request-1".to_string()));

        clear_correlation_id();
        assert!(current_correlation_id().is_none());
    }

    #[test]
    fn test_with_correlation_id_restores_previous() {
        set_correlation_id("outer");
        let seen = with_correlation_id("inner", current_correlation_id);
        assert_eq!(seen, Some("inner".to_string()));
        assert_eq!(current_correlation_id(), Some("outer".to_string()));
        clear_correlation_id();
    }

    #[test]
    fn test_errors_pick_up_correlation_id() {
        let id = generate_correlation_id();
        let error = StructuredError::new(ErrorType::Api, "timeout", "slow upstream");
        assert_eq!(error.correlation_id, Some(id));
        clear_correlation_id();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_scoped_correlation_id_follows_task_across_threads() {
        let tasks: Vec<_> = (0..8)
            .map(|n| {
                let id = format!("turn-{}", n);
                tokio::spawn(scope_correlation_id(id.clone(), async move {
                    let mut seen = Vec::new();
                    for _ in 0..4 {
                        tokio::task::yield_now().await;
                        let error = StructuredError::new(ErrorType::Api, "timeout", "slow");
                        seen.push(error.correlation_id);
                    }
                    (id, seen)
                }))
            })
            .collect();

        for task in tasks {
            let (id, seen) = task.await.unwrap();
            assert!(seen.iter().all(|seen| seen.as_deref() == Some(id.as_str())));
        }
    }

    #[tokio::test]
    async fn test_scoped_correlation_id_wins_over_thread_id() {
        set_correlation_id("thread-level");
        let seen = scope_correlation_id("task-level", async { current_correlation_id() }).await;
        assert_eq!(seen, Some("task-level".to_string()));
        assert_eq!(current_correlation_id(), Some("thread-level".to_string()));
        clear_correlation_id();
    }

    #[test]
    fn test_logging_without_subscriber_is_silent() {
        let error =
            StructuredError::new(ErrorType::Api, "http_error", "boom").severity(Severity::Critical);
        log_structured_error(&error);
    }

    #[test]
    fn test_logging_config_from_config() {
        let cfg = config::Config::builder()
            .set_override("logging.level", "debug")
            .unwrap()
            .set_override("logging.json_format", true)
            .unwrap()
            .build()
            .unwrap();

        let logging = LoggingConfig::try_from(cfg).unwrap();
        assert_eq!(logging.level, "debug");
        assert!(logging.json_format);
        assert_eq!(logging.service_name, "assistant-service");
    }
}
