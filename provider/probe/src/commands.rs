//! Subcommand handlers

use std::io::Write;

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use tracing::warn;

use provider_core::catalog::missing_recommendations;
use provider_core::{
    format_bytes, probe_all, ChatMessage, ChatOptions, LocalProvider, ProviderError,
    ProviderStatus, ProvidersConfigFile, PullProgress,
};

/// Arguments of `chat`
pub struct ChatRequest {
    pub prompt: String,
    pub model: String,
    pub system: Option<String>,
    pub temperature: Option<f32>,
}

impl ChatRequest {
    fn options(self) -> ChatOptions {
        let mut options = ChatOptions::new(self.model);
        if let Some(system) = self.system {
            options = options.with_message(ChatMessage::system(system));
        }
        options = options.with_message(ChatMessage::user(self.prompt));
        if let Some(temperature) = self.temperature {
            options = options.with_temperature(temperature);
        }
        options
    }
}

fn print_status(label: &str, base_url: &str, status: &ProviderStatus) {
    if !status.running {
        println!("{label:<10} offline  {base_url}");
        return;
    }
    let version = status.version.as_deref().unwrap_or("-");
    let loaded = status.loaded_model.as_deref().unwrap_or("-");
    println!(
        "{label:<10} running  {base_url}  version={version} models={} loaded={loaded}",
        status.models_count
    );
}

pub async fn status(provider: &dyn LocalProvider) -> Result<()> {
    let status = provider.status().await;
    print_status(provider.kind().label(), provider.base_url(), &status);
    if !status.running {
        bail!("{} is not reachable at {}", provider.name(), provider.base_url());
    }
    Ok(())
}

pub async fn status_all(config: &ProvidersConfigFile) -> Result<()> {
    for (kind, status) in probe_all(config).await {
        print_status(kind.label(), &config.get(kind).base_url, &status);
    }
    Ok(())
}

pub async fn models(provider: &dyn LocalProvider) -> Result<()> {
    let models = provider
        .list_models()
        .await
        .with_context(|| format!("Failed to list models on {}", provider.name()))?;

    if models.is_empty() {
        println!("No models installed");
        return Ok(());
    }

    for model in models {
        let params = model
            .details
            .as_ref()
            .and_then(|d| d.parameter_size.as_deref())
            .unwrap_or("-");
        let size = if model.size > 0 {
            format_bytes(model.size)
        } else {
            "-".to_string()
        };
        println!("{:<40} {params:>8} {size:>10}  {}", model.name, model.modified_at);
    }
    Ok(())
}

pub async fn pull(provider: &dyn LocalProvider, model: &str) -> Result<()> {
    let mut last_status = String::new();
    let mut report = |progress: PullProgress| {
        match progress.fraction() {
            Some(fraction) => eprint!(
                "\r{:<24} {:>5.1}%  {} / {}",
                progress.status,
                fraction * 100.0,
                format_bytes(progress.completed),
                format_bytes(progress.total)
            ),
            None if progress.status != last_status => eprintln!("{}", progress.status),
            None => {}
        }
        last_status = progress.status;
    };

    provider
        .pull_model(model, &mut report)
        .await
        .with_context(|| format!("Failed to pull {model}"))?;
    eprintln!();
    println!("Pulled {model}");
    Ok(())
}

pub async fn remove(provider: &dyn LocalProvider, model: &str) -> Result<()> {
    provider
        .delete_model(model)
        .await
        .with_context(|| format!("Failed to delete {model}"))?;
    println!("Deleted {model}");
    Ok(())
}

pub async fn chat(provider: &dyn LocalProvider, request: ChatRequest) -> Result<()> {
    let response = provider
        .chat(&request.options())
        .await
        .context("Chat request failed")?;

    println!("{}", response.content);
    eprintln!(
        "[{} | {} prompt + {} completion tokens | {:?}]",
        response.model,
        response.usage.prompt_tokens,
        response.usage.completion_tokens,
        response.finish_reason
    );
    Ok(())
}

pub async fn chat_stream(provider: &dyn LocalProvider, request: ChatRequest) -> Result<()> {
    let mut stream = provider
        .chat_stream(&request.options())
        .context("Failed to start stream")?;
    let mut stdout = std::io::stdout();

    while let Some(item) = stream.next().await {
        let chunk = match item {
            Ok(chunk) => chunk,
            Err(ProviderError::Cancelled) => break,
            Err(e) => return Err(e).context("Stream failed"),
        };
        write!(stdout, "{}", chunk.delta)?;
        stdout.flush()?;

        if chunk.done {
            writeln!(stdout)?;
            if let Some(usage) = chunk.usage {
                eprintln!("[{} tokens]", usage.total_tokens);
            }
            return Ok(());
        }
    }

    writeln!(stdout)?;
    warn!(request_id = %stream.request_id(), "Stream ended before completion");
    Ok(())
}

pub async fn embed(provider: &dyn LocalProvider, text: &str, model: &str) -> Result<()> {
    let vector = provider
        .embed(text, model)
        .await
        .with_context(|| format!("Failed to embed with {model}"))?;

    println!("{} dimensions", vector.len());
    let preview: Vec<String> = vector.iter().take(8).map(|v| format!("{v:.4}")).collect();
    println!("[{}{}]", preview.join(", "), if vector.len() > 8 { ", ..." } else { "" });
    Ok(())
}

pub async fn recommended(provider: &dyn LocalProvider) -> Result<()> {
    let installed = match provider.list_models().await {
        Ok(models) => models,
        Err(e) => {
            warn!(error = %e, "Could not list installed models");
            Vec::new()
        }
    };

    let missing = missing_recommendations(&installed);
    if missing.is_empty() {
        println!("All recommended models are installed");
        return Ok(());
    }
    for model in missing {
        println!("{:<20} {:>8}  {}", model.name, model.size, model.description);
    }
    Ok(())
}
