use futures_util::StreamExt;
use rust_mcp_schema::schema_utils::ServerMessage;

use crate::utils::sse::{sse_data_payload, SseLineBuffer};

/// Reads an event-stream response until the reply to our request arrives.
/// Server-initiated messages seen on the way are passed to `on_message`.
pub async fn next_sse_server_message(
    response: reqwest::Response,
    mut on_message: impl FnMut(&ServerMessage),
) -> Result<ServerMessage, String> {
    let mut stream = response.bytes_stream();
    let mut buffer = SseLineBuffer::default();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| err.to_string())?;
        for line in buffer.push(&chunk) {
            if let Some(message) = decode_sse_line(&line)? {
                on_message(&message);
                if is_reply(&message) {
                    return Ok(message);
                }
            }
        }
    }

    for line in buffer.finish() {
        if let Some(message) = decode_sse_line(&line)? {
            on_message(&message);
            if is_reply(&message) {
                return Ok(message);
            }
        }
    }

    Err("Empty event-stream response.".to_string())
}

fn is_reply(message: &ServerMessage) -> bool {
    matches!(
        message,
        ServerMessage::Response(_) | ServerMessage::Error(_)
    )
}

fn decode_sse_line(line: &str) -> Result<Option<ServerMessage>, String> {
    let Some(payload) = sse_data_payload(line) else {
        return Ok(None);
    };

    if payload.is_empty() {
        return Ok(None);
    }

    serde_json::from_str::<ServerMessage>(payload)
        .map(Some)
        .map_err(|err| err.to_string())
}
