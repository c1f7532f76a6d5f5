// assistant-service-rs/src/main.rs
// Main entry point for the site assistant.
// Wires one RecoveryService into the chat router and serves chat turns.

use std::env;
use std::sync::Arc;

use anyhow::Context;
use chat_router_rs::{ApiRouter, ChatService, EnvOptionStore, OptionStore, OptionStoreExt};
use dotenv::dotenv;
use recovery_rs::logging::{new_correlation_id, scope_correlation_id};
use recovery_rs::{init_logging, load_strategy_overrides, LoggingConfig, RecoveryService};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

const OPTION_PREFIX: &str = "ASSISTANT";
const DEFAULT_CONFIG_FILE: &str = "assistant.toml";

/// Reads the optional TOML config file (`ASSISTANT_CONFIG` overrides the path)
fn load_file_config() -> anyhow::Result<config::Config> {
    let path = env::var("ASSISTANT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

    config::Config::builder()
        .add_source(config::File::new(&path, config::FileFormat::Toml).required(false))
        .build()
        .with_context(|| format!("failed to read {}", path))
}

async fn run_turn(chat: &ChatService, line: &str) -> String {
    let correlation_id = new_correlation_id();
    let outcome = scope_correlation_id(correlation_id.clone(), chat.process_chat(line)).await;
    info!(correlation_id = %correlation_id, success = outcome.success, "Chat turn finished");
    outcome.message
}

async fn repl(chat: &ChatService) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    stdout
        .write_all(b"Site assistant ready. Commands: /status, /reset, /quit\n")
        .await?;

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };

        let reply = match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                chat.router().reset_state();
                format!(
                    "Router state reset, primary provider is {}",
                    chat.router().primary_provider()
                )
            }
            "/status" => {
                let snapshot = chat.router().recovery().snapshot();
                if snapshot.is_empty() {
                    "No failures recorded".to_string()
                } else {
                    serde_json::to_string_pretty(&snapshot)?
                }
            }
            message => run_turn(chat, message).await,
        };

        stdout.write_all(reply.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenv().ok();

    let file_config = load_file_config()?;
    let logging =
        LoggingConfig::try_from(file_config.clone()).context("invalid logging configuration")?;
    init_logging(Some(logging))?;

    let recovery = Arc::new(RecoveryService::new());
    let overridden = load_strategy_overrides(recovery.strategies(), &file_config);
    if overridden > 0 {
        info!(overridden, "Applied recovery strategy overrides");
    }

    let options: Arc<dyn OptionStore> = Arc::new(EnvOptionStore::new().with_prefix(OPTION_PREFIX));
    let show_technical = options.get_bool_or("show_technical_details", false);

    let router = Arc::new(ApiRouter::new(options.clone(), recovery));
    let settings = router.settings();
    for provider in [settings.primary, settings.primary.other()] {
        if !settings.provider(provider).has_credentials() {
            warn!(provider = %provider, "No API key configured for provider");
        }
    }

    let chat = ChatService::new(router).with_technical_details(show_technical);

    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        repl(&chat).await
    } else {
        println!("{}", run_turn(&chat, &args.join(" ")).await);
        Ok(())
    }
}
