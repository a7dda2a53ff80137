//! sidegate - command line front-end to the completion gateway

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use sidegate::{
    logging, CallContext, CancelToken, CompletionParams, ConfigLoader, Gateway, Message, Purpose,
    Tier,
};
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "sidegate")]
#[command(version)]
#[command(about = "Resilient multi-provider LLM completions with key pooling and failover")]
struct Cli {
    /// Configuration file layered over the built-in providers
    #[arg(short, long, env = "SIDEGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print key pool health as JSON
    Status,

    /// Run one completion and print the text
    Complete {
        /// Prompt text; read from stdin when omitted
        prompt: Option<String>,

        /// fast-scoring, deep-reasoning or lite-fallback
        #[arg(short, long, default_value = "fast-scoring")]
        purpose: Purpose,

        /// Explicit model, either "provider/model" or a bare model name
        #[arg(short, long)]
        model: Option<String>,

        /// Caller tier (hobby, pro, elite)
        #[arg(short, long, env = "SIDE_TIER", default_value = "hobby")]
        tier: Tier,

        /// System prompt prepended to the conversation
        #[arg(short, long)]
        system: Option<String>,

        #[arg(long)]
        temperature: Option<f32>,

        #[arg(long)]
        max_tokens: Option<u32>,

        /// Give up after this many seconds
        #[arg(long, default_value_t = 120)]
        timeout: u64,

        /// Keep retrying while keys cool down, for up to this many seconds
        #[arg(long)]
        wait: Option<u64>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let loader = match &cli.config {
        Some(path) => ConfigLoader::from_path(path),
        None => ConfigLoader::new(),
    }
    .context("failed to load configuration")?;
    let gateway = Gateway::from_config(loader.into_config()?)?;

    match cli.command {
        Commands::Status => {
            println!("{}", serde_json::to_string_pretty(&gateway.pool_metrics())?);
        }
        Commands::Complete {
            prompt,
            purpose,
            model,
            tier,
            system,
            temperature,
            max_tokens,
            timeout,
            wait,
            json,
        } => {
            let prompt = match prompt {
                Some(prompt) => prompt,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("failed to read prompt from stdin")?;
                    buf
                }
            };
            if prompt.trim().is_empty() {
                bail!("empty prompt");
            }

            let params = CompletionParams {
                system_prompt: system,
                temperature,
                max_tokens,
            };

            let (cancel, token) = CancelToken::new();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });
            let ctx = CallContext::new(tier)
                .with_cancellation(token)
                .with_timeout(Duration::from_secs(timeout));

            let messages = vec![Message::user(prompt)];
            let result = match wait {
                Some(secs) => {
                    gateway
                        .complete_with_backoff(
                            &ctx,
                            purpose,
                            messages,
                            model.as_deref(),
                            &params,
                            Duration::from_secs(secs),
                        )
                        .await?
                }
                None => {
                    gateway
                        .complete_with_params(&ctx, purpose, messages, model.as_deref(), &params)
                        .await?
                }
            };

            info!(
                provider = %result.provider_used,
                model = %result.model_used,
                attempts = result.attempts,
                "done"
            );
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", result.text);
            }
        }
    }

    Ok(())
}
