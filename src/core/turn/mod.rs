//! Per-connection chat session and the turn loop.
//!
//! A turn starts with one user message and ends when the model answers in
//! plain text, the provider fails, or the tool round budget runs out. Every
//! round requests a streamed completion, aggregates it, and either finishes
//! or dispatches the requested tool calls and feeds their results back.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::{ChatRequest, ChatToolDefinition};
use crate::core::aggregator::{AggregatedResponse, StreamAggregator};
use crate::core::chat_stream::{CompletionClient, StreamMessage};
use crate::core::config::Config;
use crate::core::dispatcher::ToolDispatcher;
use crate::core::message::{to_api_messages, AssistantReply, Message};
use crate::core::providers::{ProviderRegistry, ResolvedProvider};
use crate::core::sink::OutputSink;
use crate::mcp::{tool_definitions, ToolService};

pub const CONNECT_FAILURE_NOTICE: &str = "Error: Could not connect to the backend agent server.";

/// One user message and the options it was sent with.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TurnRequest {
    pub text: String,
    pub use_tools: bool,
    pub provider: Option<String>,
    pub model: Option<String>,
    /// Backing resource handed to context-aware tools, e.g. a connection name.
    pub resource: Option<String>,
}

impl TurnRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            use_tools: true,
            ..Self::default()
        }
    }
}

/// How a turn ended. Provider failures are reported to the sink, not raised.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    Ignored,
    Answered,
    ProviderFailed,
    RoundLimitReached,
}

/// Failures that end the session rather than the turn.
#[derive(Debug)]
pub enum SessionError {
    /// The caller can no longer receive output.
    Sink(String),
    /// The tool server could not be reached when the session started.
    ToolServer(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Sink(err) => write!(f, "Output is no longer deliverable: {err}"),
            SessionError::ToolServer(err) => write!(f, "Tool server unavailable: {err}"),
        }
    }
}

impl Error for SessionError {}

pub struct ChatSession {
    history: Vec<Message>,
    completions: Arc<dyn CompletionClient>,
    dispatcher: ToolDispatcher,
    providers: ProviderRegistry,
    tools: Vec<ChatToolDefinition>,
    sink: Arc<dyn OutputSink>,
    max_tool_rounds: usize,
    cancel_token: CancellationToken,
}

impl ChatSession {
    /// Opens a session: fetches the tool catalogue and seeds the history
    /// with the system prompt. When the tool server cannot be reached the
    /// caller is told so, best effort, before the error is returned.
    pub async fn start(
        config: &Config,
        completions: Arc<dyn CompletionClient>,
        tool_service: Arc<dyn ToolService>,
        providers: ProviderRegistry,
        sink: Arc<dyn OutputSink>,
    ) -> Result<Self, SessionError> {
        let tools = match tool_service.list_tools().await {
            Ok(tools) => tools,
            Err(err) => {
                tracing::warn!(error = %err, "Listing tools failed at session start");
                let _ = sink.send_text(CONNECT_FAILURE_NOTICE).await;
                return Err(SessionError::ToolServer(err));
            }
        };
        tracing::info!(tools = tools.len(), "Chat session started");

        Ok(Self::new(
            config,
            completions,
            tool_service,
            providers,
            tool_definitions(&tools),
            sink,
        ))
    }

    pub fn new(
        config: &Config,
        completions: Arc<dyn CompletionClient>,
        tool_service: Arc<dyn ToolService>,
        providers: ProviderRegistry,
        tools: Vec<ChatToolDefinition>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        let dispatcher = ToolDispatcher::new(
            tool_service,
            config.context_tools(),
            config.resource_argument(),
            config.tool_timeout(),
        );
        Self {
            history: vec![Message::System(config.system_prompt().to_string())],
            completions,
            dispatcher,
            providers,
            tools,
            sink,
            max_tool_rounds: config.max_tool_rounds(),
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn tools(&self) -> &[ChatToolDefinition] {
        &self.tools
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn tool_service(&self) -> &Arc<dyn ToolService> {
        self.dispatcher.service()
    }

    /// Runs one complete turn. Only sink failures are returned as errors.
    pub async fn handle_message(&mut self, request: TurnRequest) -> Result<TurnOutcome, SessionError> {
        if request.text.trim().is_empty() {
            return Ok(TurnOutcome::Ignored);
        }

        let provider = self
            .providers
            .resolve(request.provider.as_deref(), request.model.as_deref());
        let send_tools = request.use_tools && !self.tools.is_empty();
        tracing::info!(
            provider = %provider.id,
            model = %provider.model,
            tools = send_tools,
            resource = request.resource.as_deref().unwrap_or(""),
            "Starting turn"
        );

        self.history.push(Message::User(request.text));
        let mut rounds = 0;

        loop {
            let chat_request = ChatRequest {
                model: provider.model.clone(),
                messages: to_api_messages(&self.history),
                stream: true,
                tools: send_tools.then(|| self.tools.clone()),
                tool_choice: send_tools.then(|| "auto".to_string()),
            };

            let response = match self.complete(&provider, chat_request).await {
                Ok(response) => response,
                Err(detail) => {
                    tracing::warn!(provider = %provider.id, error = %detail, "Completion failed");
                    self.send(&format!("Error from LLM provider: {detail}")).await?;
                    return Ok(TurnOutcome::ProviderFailed);
                }
            };

            if request.use_tools && response.has_tool_calls() {
                if rounds >= self.max_tool_rounds {
                    tracing::warn!(rounds, "Tool round limit reached");
                    self.send(&format!(
                        "Stopped after {rounds} rounds of tool calls without a final answer."
                    ))
                    .await?;
                    return Ok(TurnOutcome::RoundLimitReached);
                }
                rounds += 1;

                let calls = response.tool_calls;
                self.history
                    .push(Message::Assistant(AssistantReply::ToolCalls(calls.clone())));
                let results = self
                    .dispatcher
                    .dispatch(&calls, request.resource.as_deref(), self.sink.as_ref())
                    .await;
                self.history
                    .extend(results.into_iter().map(|result| Message::Tool {
                        tool_call_id: result.tool_call_id,
                        content: result.content,
                    }));
                continue;
            }

            self.history.push(Message::assistant_text(response.text.clone()));
            self.send(&response.text).await?;
            return Ok(TurnOutcome::Answered);
        }
    }

    async fn complete(
        &self,
        provider: &ResolvedProvider,
        request: ChatRequest,
    ) -> Result<AggregatedResponse, String> {
        let mut rx = self
            .completions
            .open_stream(provider, request, self.cancel_token.child_token())
            .await?;
        let mut aggregator = StreamAggregator::new();

        loop {
            let message = tokio::select! {
                message = rx.recv() => message,
                _ = self.cancel_token.cancelled() => return Err("Request cancelled".to_string()),
            };
            match message {
                Some(StreamMessage::Fragment(fragment)) => {
                    aggregator.apply(&fragment).map_err(|err| err.to_string())?
                }
                Some(StreamMessage::Error(err)) => return Err(err),
                Some(StreamMessage::End) | None => break,
            }
        }

        Ok(aggregator.finish())
    }

    async fn send(&self, text: &str) -> Result<(), SessionError> {
        self.sink.send_text(text).await.map_err(SessionError::Sink)
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests;
