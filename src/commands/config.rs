//! Config command - manage local configuration.

use anyhow::Result;
use clap::{Args, Subcommand, ValueEnum};

use crate::local::AppConfig;

#[derive(Args)]
pub struct ConfigCmd {
    #[command(subcommand)]
    pub command: ConfigSubCmd,
}

#[derive(Subcommand)]
pub enum ConfigSubCmd {
    /// Set the API key of the model service
    SetKey(SetKeyCmd),

    /// Set the API base URL (default: https://api.openai.com)
    SetUrl(SetUrlCmd),

    /// Set the model used for embeddings, chat or vision
    SetModel(SetModelCmd),

    /// Show current configuration
    Show,
}

#[derive(Args)]
pub struct SetKeyCmd {
    /// API key (OpenAI or compatible)
    pub key: String,
}

#[derive(Args)]
pub struct SetUrlCmd {
    /// API base URL (e.g., https://openrouter.ai/api)
    pub url: String,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ModelKind {
    Embedding,
    Chat,
    Vision,
}

#[derive(Args)]
pub struct SetModelCmd {
    /// Model name (e.g., text-embedding-3-small, gpt-4o-mini)
    pub model: String,

    /// Which model to set
    #[arg(long, value_enum, default_value_t = ModelKind::Embedding)]
    pub kind: ModelKind,
}

impl ConfigCmd {
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            ConfigSubCmd::SetKey(cmd) => {
                let mut config = AppConfig::load()?;
                config.set_api_key(cmd.key.clone());
                config.save()?;
                println!("API key saved.");
            }
            ConfigSubCmd::SetUrl(cmd) => {
                let mut config = AppConfig::load()?;
                config.base_url = cmd.url.clone();
                config.validate()?;
                config.save()?;
                println!("Base URL set to: {}", cmd.url);
            }
            ConfigSubCmd::SetModel(cmd) => {
                let mut config = AppConfig::load()?;
                let (slot, label) = match cmd.kind {
                    ModelKind::Embedding => (&mut config.embedding_model, "Embedding"),
                    ModelKind::Chat => (&mut config.chat_model, "Chat"),
                    ModelKind::Vision => (&mut config.vision_model, "Vision"),
                };
                *slot = cmd.model.clone();
                config.save()?;
                println!("{} model set to: {}", label, cmd.model);
            }
            ConfigSubCmd::Show => {
                let config = AppConfig::load()?;
                println!("Config: {}", AppConfig::config_path()?.display());
                println!();
                println!(
                    "api_key:          {}",
                    if config.has_api_key() {
                        "(set)"
                    } else {
                        "(not set)"
                    }
                );
                println!("base_url:         {}", config.base_url);
                println!("embedding_model:  {}", config.embedding_model);
                println!("chat_model:       {}", config.chat_model);
                println!("vision_model:     {}", config.vision_model);
                println!(
                    "retries:          {} (base {}ms, jitter up to {}ms)",
                    config.max_retries, config.base_delay_ms, config.max_jitter_ms
                );
                println!("default_top_k:    {}", config.default_top_k);
                for (tier, overrides) in &config.plans {
                    println!("plans.{}:  {:?}", tier, overrides);
                }
            }
        }
        Ok(())
    }
}
