//! Provider Probe - Command-line client for local LLM runtimes
//!
//! Talks to Ollama, LM Studio or a llama.cpp server through the
//! `provider-core` library. Useful to check that a runtime is reachable, to
//! manage its models, and to try a prompt.
//!
//! # Usage
//!
//! ```bash
//! # Which runtimes are up?
//! provider-probe status --all
//!
//! # Installed models on the active provider
//! provider-probe models
//!
//! # Download a model with progress
//! provider-probe pull llama3.2:1b
//!
//! # Stream a reply from LM Studio
//! provider-probe --provider lm-studio chat --stream "Why is the sky blue?"
//!
//! # Verbose logging
//! RUST_LOG=debug provider-probe status
//! ```
//!
//! # Signals
//!
//! - `SIGINT` (Ctrl-C): cancels every in-flight request, then exits

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use provider_core::{
    create_active_provider, load_config_from_path, ConfigOverrides, LocalProvider, ProviderKind,
};

/// Provider Probe - Inspect and drive local LLM runtimes
#[derive(Parser, Debug)]
#[command(name = "provider-probe")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Provider to talk to (ollama, lm-studio, llama-cpp)
    #[arg(short = 'p', long, env = "LOCAL_LLM_PROVIDER", value_name = "KIND")]
    provider: Option<ProviderKind>,

    /// Base URL of the provider
    #[arg(short = 'u', long, value_name = "URL")]
    base_url: Option<String>,

    /// Per-request timeout in seconds
    #[arg(short = 't', long, value_name = "SECS")]
    timeout_secs: Option<u64>,

    /// Attempts per request, first one included
    #[arg(short = 'r', long, value_name = "N")]
    max_retries: Option<u32>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "LOCAL_LLM_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "LOCAL_LLM_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show whether the provider is running
    Status {
        /// Probe every known provider instead of the active one
        #[arg(short, long)]
        all: bool,
    },

    /// List installed models
    Models,

    /// Download a model (Ollama only)
    Pull {
        /// Model name, e.g. llama3.2:1b
        model: String,
    },

    /// Delete an installed model (Ollama only)
    Rm {
        /// Model name
        model: String,
    },

    /// Send one prompt
    Chat {
        /// Prompt text
        prompt: String,

        /// Model to use
        #[arg(short, long, default_value = "llama3.2")]
        model: String,

        /// Optional system message
        #[arg(short, long)]
        system: Option<String>,

        /// Sampling temperature
        #[arg(long)]
        temperature: Option<f32>,

        /// Print the reply as it is generated
        #[arg(long)]
        stream: bool,
    },

    /// Print the embedding vector of a text
    Embed {
        /// Text to embed
        text: String,

        /// Embedding model
        #[arg(short, long, default_value = "nomic-embed-text")]
        model: String,
    },

    /// Suggest models that are not installed yet
    Recommended,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            active: self.provider,
            base_url: self.base_url.clone(),
            timeout_secs: self.timeout_secs,
            max_retries: self.max_retries,
        }
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("provider_probe={level},provider_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Cancel everything in flight on Ctrl-C
fn spawn_interrupt_handler(provider: Arc<dyn LocalProvider>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let cancelled = provider.cancel_all();
            info!(cancelled, "Received SIGINT, cancelled in-flight requests");
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let mut config = load_config_from_path(args.config.clone())
        .context("Failed to load provider configuration")?;
    args.overrides()
        .apply(&mut config)
        .context("Invalid command-line override")?;

    debug!(
        active = %config.active,
        source = %config.source(),
        path = ?config.config_file_path,
        "Configuration loaded"
    );

    if let Command::Status { all: true } = args.command {
        return commands::status_all(&config).await;
    }

    let provider: Arc<dyn LocalProvider> = Arc::from(create_active_provider(&config));
    spawn_interrupt_handler(Arc::clone(&provider));

    match args.command {
        Command::Status { .. } => commands::status(provider.as_ref()).await,
        Command::Models => commands::models(provider.as_ref()).await,
        Command::Pull { model } => commands::pull(provider.as_ref(), &model).await,
        Command::Rm { model } => commands::remove(provider.as_ref(), &model).await,
        Command::Chat {
            prompt,
            model,
            system,
            temperature,
            stream,
        } => {
            let request = commands::ChatRequest {
                prompt,
                model,
                system,
                temperature,
            };
            if stream {
                commands::chat_stream(provider.as_ref(), request).await
            } else {
                commands::chat(provider.as_ref(), request).await
            }
        }
        Command::Embed { text, model } => commands::embed(provider.as_ref(), &text, &model).await,
        Command::Recommended => commands::recommended(provider.as_ref()).await,
    }
}
