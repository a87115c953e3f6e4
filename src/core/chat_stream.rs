use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::{ChatRequest, ChatResponse};
use crate::core::aggregator::StreamFragment;
use crate::core::providers::ResolvedProvider;
use crate::utils::sse::{sse_data_payload, SseLineBuffer};
use crate::utils::url::construct_api_url;

#[derive(Clone, Debug)]
pub enum StreamMessage {
    Fragment(StreamFragment),
    Error(String),
    End,
}

/// Source of streamed chat completions.
///
/// `open_stream` fails when the request cannot be made or the provider
/// rejects it outright. Failures after the body started streaming arrive as
/// [`StreamMessage::Error`]. Dropping the receiver stops the stream.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn open_stream(
        &self,
        provider: &ResolvedProvider,
        request: ChatRequest,
        cancel_token: CancellationToken,
    ) -> Result<mpsc::UnboundedReceiver<StreamMessage>, String>;
}

fn handle_data_payload(payload: &str, tx: &mpsc::UnboundedSender<StreamMessage>) -> bool {
    if payload == "[DONE]" {
        let _ = tx.send(StreamMessage::End);
        return true;
    }
    if payload.is_empty() {
        return false;
    }

    let parsed = serde_json::from_str::<serde_json::Value>(payload)
        .ok()
        .filter(|value| value.get("error").is_none())
        .and_then(|value| serde_json::from_value::<ChatResponse>(value).ok());

    match parsed {
        Some(response) => {
            let fragment = StreamFragment::from_response(response);
            if !fragment.is_empty() {
                let _ = tx.send(StreamMessage::Fragment(fragment));
            }
            false
        }
        None => {
            let _ = tx.send(StreamMessage::Error(summarize_api_error(payload)));
            let _ = tx.send(StreamMessage::End);
            true
        }
    }
}

/// Returns `true` once the stream is finished.
fn process_sse_line(line: &str, tx: &mpsc::UnboundedSender<StreamMessage>) -> bool {
    sse_data_payload(line)
        .map(|payload| handle_data_payload(payload, tx))
        .unwrap_or(false)
}

const MAX_ERROR_SUMMARY_CHARS: usize = 300;

/// The human-readable message of an error payload, if it carries one.
fn error_message(value: &serde_json::Value) -> Option<&str> {
    value
        .pointer("/error/message")
        .or_else(|| value.get("error").filter(|error| error.is_string()))
        .or_else(|| value.get("message"))
        .and_then(serde_json::Value::as_str)
}

/// One-line description of an error body. JSON bodies are reduced to their
/// message when they have one; other text is whitespace-collapsed and capped.
fn summarize_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }

    let summary = match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value) => error_message(&value)
            .map(str::to_owned)
            .unwrap_or_else(|| value.to_string()),
        Err(_) => trimmed.to_string(),
    };

    let collapsed = summary.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(MAX_ERROR_SUMMARY_CHARS) {
        Some((cut, _)) => format!("{}…", &collapsed[..cut]),
        None => collapsed,
    }
}

/// Streams completions from an OpenAI-compatible `chat/completions` endpoint.
#[derive(Clone)]
pub struct HttpCompletionClient {
    client: reqwest::Client,
}

impl HttpCompletionClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn open_stream(
        &self,
        provider: &ResolvedProvider,
        request: ChatRequest,
        cancel_token: CancellationToken,
    ) -> Result<mpsc::UnboundedReceiver<StreamMessage>, String> {
        let chat_url = construct_api_url(&provider.base_url, "chat/completions");
        tracing::debug!(
            provider = %provider.id,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.as_ref().map_or(0, Vec::len),
            url = %chat_url,
            "Requesting streamed completion"
        );

        let http_request = self
            .client
            .post(chat_url)
            .header("Content-Type", "application/json");
        let http_request = crate::utils::auth::add_auth_headers(http_request, &provider.api_key);

        let response = tokio::select! {
            result = http_request.json(&request).send() => {
                result.map_err(|err| err.to_string())?
            }
            _ = cancel_token.cancelled() => {
                return Err("Request cancelled".to_string());
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            tracing::debug!(%status, "Completion request rejected");
            return Err(format!("{status}: {}", summarize_api_error(&error_text)));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut lines = SseLineBuffer::default();

            loop {
                let chunk = tokio::select! {
                    chunk = stream.next() => chunk,
                    _ = cancel_token.cancelled() => return,
                    _ = tx.closed() => {
                        tracing::debug!("Completion receiver dropped; stopping stream");
                        return;
                    }
                };

                match chunk {
                    Some(Ok(bytes)) => {
                        for line in lines.push(&bytes) {
                            if process_sse_line(&line, &tx) {
                                return;
                            }
                        }
                    }
                    Some(Err(err)) => {
                        let _ = tx.send(StreamMessage::Error(err.to_string()));
                        let _ = tx.send(StreamMessage::End);
                        return;
                    }
                    None => break,
                }
            }

            for line in lines.finish() {
                if process_sse_line(&line, &tx) {
                    return;
                }
            }
            let _ = tx.send(StreamMessage::End);
        });

        Ok(rx)
    }
}
