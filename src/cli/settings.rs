//! Backend AI provider settings.
//!
//! The backend masks a stored OpenAI key as `***` and treats `***` (or a
//! missing key) in a save or test request as "keep the stored key", so the
//! current settings can be fetched, patched and sent back as they are.

use clap::{Args, Subcommand};

use super::{CliContext, CliError, print_json};
use crate::api::types::{AiProvider, AiSettings};

#[derive(Args, Debug)]
pub(crate) struct SettingsCommand {
    #[command(subcommand)]
    command: SettingsSubcommand,
}

#[derive(Subcommand, Debug)]
enum SettingsSubcommand {
    Show,
    /// Update the provider configuration; unset flags keep their current value.
    Set(SettingsPatch),
    /// Check the provider answers, optionally with unsaved overrides.
    Test(SettingsPatch),
    /// List models offered by a provider.
    Models {
        #[arg(long, value_parser = parse_provider)]
        provider: AiProvider,
        /// Ollama endpoint to query instead of the configured one.
        #[arg(long)]
        endpoint: Option<String>,
    },
}

#[derive(Args, Debug, Default, Clone)]
pub(crate) struct SettingsPatch {
    #[arg(long, value_parser = parse_provider)]
    pub provider: Option<AiProvider>,
    #[arg(long)]
    pub openai_api_key: Option<String>,
    #[arg(long)]
    pub openai_model: Option<String>,
    #[arg(long)]
    pub openai_endpoint: Option<String>,
    #[arg(long)]
    pub ollama_endpoint: Option<String>,
    #[arg(long)]
    pub ollama_model: Option<String>,
}

fn parse_provider(raw: &str) -> Result<AiProvider, String> {
    raw.parse()
}

/// Apply the flags that were given on top of `current`.
pub(crate) fn apply_patch(mut current: AiSettings, patch: SettingsPatch) -> AiSettings {
    if let Some(provider) = patch.provider {
        current.provider = provider;
    }
    let overrides = [
        (&mut current.openai_api_key, patch.openai_api_key),
        (&mut current.openai_model, patch.openai_model),
        (&mut current.openai_endpoint, patch.openai_endpoint),
        (&mut current.ollama_endpoint, patch.ollama_endpoint),
        (&mut current.ollama_model, patch.ollama_model),
    ];
    for (slot, value) in overrides {
        if let Some(value) = value {
            // An empty flag clears the setting.
            *slot = Some(value).filter(|v| !v.trim().is_empty());
        }
    }
    current
}

fn masked(settings: &AiSettings) -> AiSettings {
    let mut shown = settings.clone();
    if shown.openai_api_key.is_some() {
        shown.openai_api_key = Some("***".to_string());
    }
    shown
}

pub(crate) async fn run(ctx: &CliContext, cmd: SettingsCommand) -> Result<(), CliError> {
    let client = ctx.client()?;
    match cmd.command {
        SettingsSubcommand::Show => {
            let settings = client.ai_settings().await?;
            if ctx.json {
                return print_json(&masked(&settings));
            }
            print_settings(&settings);
        }
        SettingsSubcommand::Set(patch) => {
            let settings = apply_patch(client.ai_settings().await?, patch);
            let saved = client.save_ai_settings(&settings).await?;
            if ctx.json {
                return print_json(&saved);
            }
            println!("{}", saved.message);
        }
        SettingsSubcommand::Test(patch) => {
            let settings = apply_patch(client.ai_settings().await?, patch);
            let result = client.test_ai_settings(&settings).await?;
            if ctx.json {
                return print_json(&result);
            }
            println!("{}", result.status);
            if let Some(model) = &result.model {
                println!("model: {model}");
            }
            if let Some(reply) = &result.test_response {
                println!("response: {reply}");
            }
        }
        SettingsSubcommand::Models { provider, endpoint } => {
            let models = match provider {
                AiProvider::Ollama => client.ollama_models(endpoint.as_deref()).await?,
                AiProvider::OpenAi => client.openai_models().await?,
            };
            if ctx.json {
                return print_json(&models);
            }
            for name in model_names(&models) {
                println!("{name}");
            }
        }
    }
    Ok(())
}

/// Model names from either provider's listing shape: `{"models": [...]}`
/// with strings or objects carrying `name` or `id`.
pub(crate) fn model_names(listing: &serde_json::Value) -> Vec<String> {
    let entries = listing
        .get("models")
        .or_else(|| listing.get("data"))
        .and_then(serde_json::Value::as_array)
        .cloned()
        .unwrap_or_default();
    entries
        .iter()
        .filter_map(|entry| match entry {
            serde_json::Value::String(name) => Some(name.clone()),
            other => other
                .get("name")
                .or_else(|| other.get("id"))
                .and_then(serde_json::Value::as_str)
                .map(str::to_string),
        })
        .collect()
}

fn print_settings(settings: &AiSettings) {
    let provider = match settings.provider {
        AiProvider::OpenAi => "openai",
        AiProvider::Ollama => "ollama",
    };
    println!("provider:        {provider}");
    let rows = [
        ("openai_api_key", settings.openai_api_key.as_ref().map(|_| "***".to_string())),
        ("openai_model", settings.openai_model.clone()),
        ("openai_endpoint", settings.openai_endpoint.clone()),
        ("ollama_endpoint", settings.ollama_endpoint.clone()),
        ("ollama_model", settings.ollama_model.clone()),
    ];
    for (name, value) in rows {
        println!("{:<16} {}", format!("{name}:"), value.unwrap_or_else(|| "-".to_string()));
    }
}
