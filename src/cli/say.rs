//! Non-interactive "say" command

use std::error::Error;
use std::sync::Arc;

use crate::cli::{open_session, TurnDefaults};
use crate::core::config::Config;
use crate::core::sink::{OutputSink, WriterSink};
use crate::core::turn::TurnOutcome;

pub async fn run_say(
    config: &Config,
    defaults: TurnDefaults,
    prompt: Vec<String>,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: mcpchat say <prompt>");
        std::process::exit(1);
    }

    let sink: Arc<dyn OutputSink> = Arc::new(WriterSink::stdout());
    let mut session = open_session(config, sink).await?;

    match session.handle_message(defaults.request(prompt)).await? {
        TurnOutcome::Answered | TurnOutcome::Ignored => Ok(()),
        TurnOutcome::ProviderFailed | TurnOutcome::RoundLimitReached => std::process::exit(1),
    }
}
