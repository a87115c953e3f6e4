//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod chat;
pub mod connections;
pub mod model_list;
pub mod provider_list;
pub mod say;
pub mod server_info;

use std::error::Error;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cli::chat::run_chat;
use crate::cli::connections::list_connections;
use crate::cli::model_list::list_models;
use crate::cli::provider_list::list_providers;
use crate::cli::say::run_say;
use crate::cli::server_info::show_server_info;
use crate::core::chat_stream::HttpCompletionClient;
use crate::core::config::data::path_display;
use crate::core::config::Config;
use crate::core::providers::ProviderRegistry;
use crate::core::sink::OutputSink;
use crate::core::turn::{ChatSession, SessionError, TurnRequest, CONNECT_FAILURE_NOTICE};
use crate::mcp::{McpClient, ToolService};

const DEFAULT_LOG_FILTER: &str = "mcpchat=info";

#[derive(Parser)]
#[command(name = "mcpchat")]
#[command(about = "Chat with LLM providers that can call MCP tools")]
#[command(
    long_about = "mcpchat connects an OpenAI-compatible chat model to the tools of a Model Context \
Protocol server. When the model asks for tools, mcpchat runs them, hands the results back, \
and prints the final answer.\n\n\
Environment Variables:\n\
  OPENAI_API_KEY    Key for the openai provider\n\
  OPENAI_MODEL      Model used by the openai provider\n\
  OLLAMA_BASE_URL   OpenAI-compatible endpoint of an Ollama server\n\
  MCP_SERVER_URL    Streamable HTTP endpoint of the MCP server\n\
  RUST_LOG          Log filter (defaults to mcpchat=info)\n\n\
Chat commands:\n\
  /tools on|off     Offer tools to the model, or not\n\
  /resource <name>  Select the resource passed to context-aware tools\n\
  /resource         Clear the selected resource\n\
  /quit             Leave the chat"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file to use instead of the default location
    #[arg(short = 'c', long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write logs to the specified file instead of stderr
    #[arg(short = 'l', long, global = true)]
    pub log: Option<String>,

    /// Provider to use, or list available providers if no provider specified
    #[arg(short = 'p', long, global = true, value_name = "PROVIDER", num_args = 0..=1, default_missing_value = "")]
    pub provider: Option<String>,

    /// Model to use for chat, or list available models if no model specified
    #[arg(short = 'm', long, global = true, value_name = "MODEL", num_args = 0..=1, default_missing_value = "")]
    pub model: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat (default)
    Chat {
        /// Do not offer tools to the model
        #[arg(long)]
        no_tools: bool,
        /// Resource handed to context-aware tools, e.g. a database connection name
        #[arg(short = 'r', long)]
        resource: Option<String>,
    },
    /// Send a single message and print the answer
    Say {
        /// Do not offer tools to the model
        #[arg(long)]
        no_tools: bool,
        /// Resource handed to context-aware tools, e.g. a database connection name
        #[arg(short = 'r', long)]
        resource: Option<String>,
        /// Message to send
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// Show the tools, resources and prompts the MCP server exposes
    ServerInfo,
    /// List the database connections known to the MCP server
    Connections,
    /// List the models available on the Ollama server
    Models,
    /// List configured providers
    Providers,
    /// Print the effective configuration
    Config {
        /// Write a starter configuration file if none exists
        #[arg(long)]
        init: bool,
    },
}

/// Per-turn options chosen on the command line.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TurnDefaults {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub use_tools: bool,
    pub resource: Option<String>,
}

impl TurnDefaults {
    pub fn request(&self, text: impl Into<String>) -> TurnRequest {
        TurnRequest {
            text: text.into(),
            use_tools: self.use_tools,
            provider: self.provider.clone(),
            model: self.model.clone(),
            resource: self.resource.clone(),
        }
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(args.log.as_deref())?;

    tokio::runtime::Runtime::new()?.block_on(async_main(args))
}

fn init_logging(log_file: Option<&str>) -> Result<(), Box<dyn Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|err| err as Box<dyn Error>)?;
        }
        None => builder
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|err| err as Box<dyn Error>)?,
    }
    Ok(())
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let command = args.command.unwrap_or(Commands::Chat {
        no_tools: false,
        resource: None,
    });

    if let Commands::Config { init } = command {
        return show_config(args.config.as_deref(), init);
    }

    let config = Config::load(args.config.as_deref())?;

    match command {
        Commands::Chat { no_tools, resource } => match (args.provider.as_deref(), args.model.as_deref()) {
            // -p or -m without a value lists the choices instead of chatting
            (Some(""), _) => list_providers(&config),
            (_, Some("")) => list_models(&config).await,
            _ => {
                let defaults = turn_defaults(args.provider, args.model, no_tools, resource);
                run_chat(&config, defaults).await
            }
        },
        Commands::Say {
            no_tools,
            resource,
            prompt,
        } => {
            let defaults = turn_defaults(args.provider, args.model, no_tools, resource);
            run_say(&config, defaults, prompt).await
        }
        Commands::ServerInfo => show_server_info(&config).await,
        Commands::Connections => list_connections(&config).await,
        Commands::Models => list_models(&config).await,
        Commands::Providers => list_providers(&config),
        Commands::Config { .. } => Ok(()),
    }
}

fn turn_defaults(
    provider: Option<String>,
    model: Option<String>,
    no_tools: bool,
    resource: Option<String>,
) -> TurnDefaults {
    TurnDefaults {
        provider: non_empty(provider),
        model: non_empty(model),
        use_tools: !no_tools,
        resource: non_empty(resource),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn show_config(explicit: Option<&Path>, init: bool) -> Result<(), Box<dyn Error>> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => Config::get_config_path()?,
    };

    if init {
        if path.exists() {
            println!("⚠️  Config file already exists: {}", path_display(&path));
        } else {
            Config::starter().save_to_path(&path)?;
            println!("✅ Wrote starter config to {}", path_display(&path));
        }
        return Ok(());
    }

    let config = Config::load(Some(&path))?;
    println!("# {}", path_display(&path));
    print!("{}", config.to_toml()?);
    Ok(())
}

/// Connects to the MCP server and opens a chat session writing to `sink`.
///
/// A server that cannot be reached is reported on the sink before the error
/// is returned, the same way a failed tool listing is.
pub async fn open_session(
    config: &Config,
    sink: Arc<dyn OutputSink>,
) -> Result<ChatSession, SessionError> {
    let client = match McpClient::connect(config).await {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(server = %config.mcp_base_url(), error = %err, "MCP handshake failed");
            let _ = sink.send_text(CONNECT_FAILURE_NOTICE).await;
            return Err(SessionError::ToolServer(err));
        }
    };
    let tool_service: Arc<dyn ToolService> = Arc::new(client);
    let completions = Arc::new(HttpCompletionClient::new(reqwest::Client::new()));
    let providers = ProviderRegistry::from_config(config);

    ChatSession::start(config, completions, tool_service, providers, sink).await
}
