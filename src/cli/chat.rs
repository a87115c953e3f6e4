//! Line-oriented chat over stdin/stdout.

use std::error::Error;
use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cli::{open_session, TurnDefaults};
use crate::core::config::Config;
use crate::core::sink::{OutputSink, WriterSink};

/// One line typed at the chat prompt.
#[derive(Debug, PartialEq, Eq)]
pub enum ChatInput {
    Message(String),
    Tools(bool),
    Resource(Option<String>),
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse_input(line: &str) -> ChatInput {
    let line = line.trim();
    if line.is_empty() {
        return ChatInput::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return ChatInput::Message(line.to_string());
    };

    let (name, argument) = match command.split_once(char::is_whitespace) {
        Some((name, argument)) => (name, argument.trim()),
        None => (command, ""),
    };

    match (name, argument) {
        ("quit" | "exit", _) => ChatInput::Quit,
        ("help", _) => ChatInput::Help,
        ("tools", "on") => ChatInput::Tools(true),
        ("tools", "off") => ChatInput::Tools(false),
        ("resource", "") => ChatInput::Resource(None),
        ("resource", name) => ChatInput::Resource(Some(name.to_string())),
        _ => ChatInput::Unknown(line.to_string()),
    }
}

const HELP_TEXT: &str = "Commands:
  /tools on|off     Offer tools to the model, or not
  /resource <name>  Select the resource passed to context-aware tools
  /resource         Clear the selected resource
  /quit             Leave the chat";

pub async fn run_chat(config: &Config, mut defaults: TurnDefaults) -> Result<(), Box<dyn Error>> {
    let sink: Arc<dyn OutputSink> = Arc::new(WriterSink::stdout());
    let mut session = open_session(config, sink.clone()).await?;

    let provider = session
        .providers()
        .resolve(defaults.provider.as_deref(), defaults.model.as_deref());
    eprintln!("💬 mcpchat: {} tools available", session.tools().len());
    eprintln!("📡 Provider: {} ({})", provider.id, provider.model);
    eprintln!("💡 Type /help for commands, /quit or Ctrl+D to leave");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_input(&line) {
            ChatInput::Empty => {}
            ChatInput::Quit => break,
            ChatInput::Help => sink.send_text(HELP_TEXT).await?,
            ChatInput::Tools(enabled) => {
                defaults.use_tools = enabled;
                let state = if enabled { "enabled" } else { "disabled" };
                sink.send_text(&format!("Tools {state}.")).await?;
            }
            ChatInput::Resource(resource) => {
                let notice = match &resource {
                    Some(name) => format!("Using resource `{name}`."),
                    None => "No resource selected.".to_string(),
                };
                defaults.resource = resource;
                sink.send_text(&notice).await?;
            }
            ChatInput::Unknown(command) => {
                sink.send_text(&format!("Unknown command: {command}")).await?;
            }
            ChatInput::Message(text) => {
                session.handle_message(defaults.request(text)).await?;
            }
        }
    }

    Ok(())
}
