//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod chat_repl;
pub mod model_list;
pub mod provider_list;

use std::error::Error;

use clap::{Parser, Subcommand};

use crate::cli::chat_repl::run_chat;
use crate::cli::model_list::list_models;
use crate::cli::provider_list::list_providers;
use crate::core::app::App;
use crate::core::config::{Config, KeyCache};
use crate::core::settings::{BuiltinProvider, NewCustomProvider};
use crate::utils::logging::init_tracing;

#[derive(Parser)]
#[command(name = "spacechat")]
#[command(about = "Chat with multiple LLM providers, organized into spaces")]
#[command(
    long_about = "spacechat talks to a local inference backend that proxies Google, OpenAI, Groq, \
and any OpenAI-compatible endpoint you register. Conversations live in spaces; files can be \
attached to a conversation or added to the space's knowledge base.\n\n\
Chat commands:\n\
  /upload <path> [--kb]   Upload a file (--kb adds it to the space knowledge base)\n\
  /quit                   Leave the chat\n\n\
Environment Variables:\n\
  RUST_LOG          tracing filter (overridden by --log-filter)"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Base URL of the inference backend
    #[arg(short = 'b', long, global = true, value_name = "URL")]
    pub backend_url: Option<String>,

    /// Model token, e.g. openai/gpt-4o or custom/<provider-id>/<model>
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// tracing filter directive, e.g. spacechat=debug
    #[arg(long, global = true, value_name = "FILTER")]
    pub log_filter: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat (default)
    Chat {
        /// Name of the space to create for this session
        #[arg(short, long, default_value = "Personal")]
        space: String,
    },
    /// Refresh and list selectable models
    Models,
    /// Manage API keys for the built-in providers
    Keys {
        #[command(subcommand)]
        command: KeyCommands,
    },
    /// Manage custom OpenAI-compatible providers
    Providers {
        #[command(subcommand)]
        command: ProviderCommands,
    },
}

#[derive(Subcommand)]
pub enum KeyCommands {
    /// Store a key for google, openai, or groq
    Set { provider: String, key: String },
    /// Remove the key for google, openai, or groq
    Remove { provider: String },
}

#[derive(Subcommand)]
pub enum ProviderCommands {
    /// List registered custom providers
    List,
    /// Register a custom provider
    Add {
        name: String,
        base_url: String,
        #[arg(long, default_value = "")]
        api_key: String,
        /// Fallback model names, used until the backend reports a list
        #[arg(long = "fallback-model", value_name = "MODEL")]
        models: Vec<String>,
    },
    /// Remove a custom provider by id
    Remove { id: String },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let mut config = Config::load()?;
    init_tracing(args.log_filter.as_deref(), config.log_filter.as_deref())?;
    if let Some(url) = args.backend_url.clone() {
        config.backend_url = Some(url);
    }

    let app = App::from_config(config, Some(KeyCache::default_location()));
    app.settings.load().await;

    let result = run_command(&app, &args).await;
    app.shutdown().await;
    result
}

async fn run_command(app: &App, args: &Args) -> Result<(), Box<dyn Error>> {
    match &args.command {
        None => run_chat(app, "Personal", args.model.as_deref()).await,
        Some(Commands::Chat { space }) => run_chat(app, space, args.model.as_deref()).await,
        Some(Commands::Models) => {
            app.settings.fetch_models().await;
            list_models(&app.settings.snapshot());
            Ok(())
        }
        Some(Commands::Keys { command }) => {
            match command {
                KeyCommands::Set { provider, key } => {
                    let provider: BuiltinProvider = provider.parse()?;
                    app.settings.set_api_key(provider, key.trim());
                    println!("✅ Stored API key for {}", provider.display_name());
                }
                KeyCommands::Remove { provider } => {
                    let provider: BuiltinProvider = provider.parse()?;
                    app.settings.remove_api_key(provider);
                    println!("✅ Removed API key for {}", provider.display_name());
                }
            }
            app.settings.save_keys();
            Ok(())
        }
        Some(Commands::Providers { command }) => {
            match command {
                ProviderCommands::List => list_providers(&app.settings.snapshot()),
                ProviderCommands::Add {
                    name,
                    base_url,
                    api_key,
                    models,
                } => {
                    let id = app.settings.add_custom_provider(NewCustomProvider {
                        name: name.clone(),
                        base_url: base_url.clone(),
                        api_key: api_key.clone(),
                        models: models.clone(),
                    });
                    println!("✅ Added provider '{name}' with id {id}");
                }
                ProviderCommands::Remove { id } => {
                    if app.settings.remove_custom_provider(id) {
                        println!("✅ Removed provider {id}");
                    } else {
                        return Err(format!("No custom provider with id {id}").into());
                    }
                }
            }
            Ok(())
        }
    }
}
