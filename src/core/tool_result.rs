//! Normalization of tool outcomes into the JSON text fed back to the model.

use std::io;

use rust_mcp_schema::{CallToolResult, ContentBlock};
use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::Value;

pub const UNKNOWN_TOOL_ERROR: &str = "Tool call failed with an unknown error.";

/// What happened when a tool ran. Exactly one payload kind is carried.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolExecutionOutcome {
    Error(Option<String>),
    Structured(Value),
    Text(String),
    Empty,
}

impl ToolExecutionOutcome {
    pub fn error(message: impl Into<String>) -> Self {
        ToolExecutionOutcome::Error(Some(message.into()))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolExecutionOutcome::Error(_))
    }

    /// Error first, then structured content, then text blocks, then nothing.
    pub fn from_call_result(result: &CallToolResult) -> Self {
        if result.is_error.unwrap_or(false) {
            let message = result.content.first().and_then(|block| match block {
                ContentBlock::TextContent(text) => Some(text.text.clone()),
                _ => None,
            });
            return ToolExecutionOutcome::Error(message);
        }

        if let Some(structured) = &result.structured_content {
            return ToolExecutionOutcome::Structured(Value::Object(structured.clone()));
        }

        if !result.content.is_empty() {
            let text: String = result
                .content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::TextContent(text) => Some(text.text.as_str()),
                    _ => None,
                })
                .collect();
            return ToolExecutionOutcome::Text(text);
        }

        ToolExecutionOutcome::Empty
    }

    pub fn normalize(&self) -> String {
        match self {
            ToolExecutionOutcome::Error(message) => {
                let message = message
                    .as_deref()
                    .filter(|message| !message.is_empty())
                    .unwrap_or(UNKNOWN_TOOL_ERROR);
                let mut payload = serde_json::Map::new();
                payload.insert("error".to_string(), Value::String(message.to_string()));
                to_spaced_json(&Value::Object(payload))
            }
            ToolExecutionOutcome::Structured(value) => to_spaced_json(value),
            ToolExecutionOutcome::Text(text) => to_spaced_json(text),
            ToolExecutionOutcome::Empty => to_spaced_json(""),
        }
    }
}

/// Separators follow the `", "` / `": "` convention tool servers commonly emit.
#[derive(Default)]
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

fn to_spaced_json<T: Serialize + ?Sized>(value: &T) -> String {
    let mut buffer = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, SpacedFormatter);
    if value.serialize(&mut serializer).is_err() {
        return "\"Unable to serialize tool result.\"".to_string();
    }
    String::from_utf8(buffer).unwrap_or_else(|_| "\"Unable to serialize tool result.\"".to_string())
}
