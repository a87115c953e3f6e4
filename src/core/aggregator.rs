//! Reassembly of streamed assistant output.
//!
//! Providers deliver tool calls as a series of deltas keyed by a position
//! index. The first delta for an index usually carries the call id and the
//! function name, and later deltas carry slices of the JSON argument text.
//! [`StreamAggregator`] folds those deltas, together with the text deltas,
//! into an [`AggregatedResponse`] once the stream has ended.

use serde_json::{Map, Value};

use crate::api::ChatResponse;

/// Most tool calls one response may carry. Deltas indexed past this end the
/// stream with an error.
pub const MAX_TOOL_CALLS: usize = 128;

/// One incremental unit of a streamed completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamFragment {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

impl StreamFragment {
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            content: Some(delta.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(delta: ToolCallDelta) -> Self {
        Self {
            content: None,
            tool_calls: vec![delta],
        }
    }

    /// Only the first choice is consumed; chunks without choices (usage
    /// trailers) map to an empty fragment.
    pub fn from_response(response: ChatResponse) -> Self {
        let Some(choice) = response.choices.into_iter().next() else {
            return Self::default();
        };

        let tool_calls = choice
            .delta
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|delta| {
                let (name, arguments) = match delta.function {
                    Some(function) => (function.name, function.arguments),
                    None => (None, None),
                };
                ToolCallDelta {
                    index: delta.index.unwrap_or(0) as usize,
                    id: delta.id,
                    name,
                    arguments,
                }
            })
            .collect();

        Self {
            content: choice.delta.content,
            tool_calls,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.tool_calls.is_empty()
    }
}

/// A fully aggregated tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    /// Raw concatenated argument text, kept verbatim for history replay.
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidArguments {
    pub tool_name: String,
    pub detail: String,
}

impl std::fmt::Display for InvalidArguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid arguments for {}", self.tool_name)
    }
}

impl std::error::Error for InvalidArguments {}

/// A delta addressed a slot past [`MAX_TOOL_CALLS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallLimitExceeded {
    pub index: usize,
}

impl std::fmt::Display for ToolCallLimitExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tool call index {} exceeds the limit of {} calls per response",
            self.index, MAX_TOOL_CALLS
        )
    }
}

impl std::error::Error for ToolCallLimitExceeded {}

impl ToolCallRequest {
    /// Parses the accumulated argument text. Blank text is an empty object;
    /// anything that is not a JSON object is rejected.
    pub fn parse_arguments(&self) -> Result<Map<String, Value>, InvalidArguments> {
        let raw = self.arguments.trim();
        if raw.is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(InvalidArguments {
                tool_name: self.name.clone(),
                detail: format!("expected a JSON object, got {other}"),
            }),
            Err(err) => Err(InvalidArguments {
                tool_name: self.name.clone(),
                detail: err.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl AggregatedResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Debug, Default)]
struct ToolCallSlot {
    id: String,
    name: String,
    arguments: String,
}

/// Buffer for a single streamed response. Not reusable across requests.
#[derive(Debug, Default)]
pub struct StreamAggregator {
    text: String,
    slots: Vec<ToolCallSlot>,
}

impl StreamAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, fragment: &StreamFragment) -> Result<(), ToolCallLimitExceeded> {
        if let Some(content) = &fragment.content {
            self.text.push_str(content);
        }

        for delta in &fragment.tool_calls {
            if delta.index >= MAX_TOOL_CALLS {
                return Err(ToolCallLimitExceeded { index: delta.index });
            }
            if self.slots.len() <= delta.index {
                self.slots.resize_with(delta.index + 1, ToolCallSlot::default);
            }
            let slot = &mut self.slots[delta.index];

            if slot.id.is_empty() {
                if let Some(id) = delta.id.as_deref().filter(|id| !id.is_empty()) {
                    slot.id = id.to_string();
                }
            }
            if slot.name.is_empty() {
                if let Some(name) = delta.name.as_deref().filter(|name| !name.is_empty()) {
                    slot.name = name.to_string();
                }
            }
            if let Some(arguments) = &delta.arguments {
                slot.arguments.push_str(arguments);
            }
        }
        Ok(())
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Slots that never received a function name are dropped; they cannot be
    /// executed or replayed to the provider.
    pub fn finish(self) -> AggregatedResponse {
        let tool_calls = self
            .slots
            .into_iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                if slot.name.is_empty() {
                    if !slot.id.is_empty() || !slot.arguments.is_empty() {
                        tracing::warn!(index, id = %slot.id, "Dropping tool call without a name");
                    }
                    return None;
                }
                Some(ToolCallRequest {
                    id: if slot.id.is_empty() {
                        format!("tool-call-{index}")
                    } else {
                        slot.id
                    },
                    name: slot.name,
                    arguments: slot.arguments,
                })
            })
            .collect();

        AggregatedResponse {
            text: self.text,
            tool_calls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn delta(index: usize, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> ToolCallDelta {
        ToolCallDelta {
            index,
            id: id.map(str::to_string),
            name: name.map(str::to_string),
            arguments: args.map(str::to_string),
        }
    }

    fn aggregate(fragments: &[StreamFragment]) -> AggregatedResponse {
        let mut aggregator = StreamAggregator::new();
        for fragment in fragments {
            aggregator.apply(fragment).expect("within tool call limit");
        }
        aggregator.finish()
    }

    #[test]
    fn reassembles_split_arguments() {
        let response = aggregate(&[
            StreamFragment::tool_call(delta(0, Some("a"), Some("get_x"), None)),
            StreamFragment::tool_call(delta(0, None, None, Some("{\"n\""))),
            StreamFragment::tool_call(delta(0, None, None, Some(":1}"))),
        ]);

        assert_eq!(
            response.tool_calls,
            vec![ToolCallRequest {
                id: "a".to_string(),
                name: "get_x".to_string(),
                arguments: "{\"n\":1}".to_string(),
            }]
        );
        let parsed = response.tool_calls[0].parse_arguments().expect("valid json");
        assert_eq!(Value::Object(parsed), json!({"n": 1}));
        assert_eq!(response.text, "");
    }

    #[test]
    fn text_only_stream_has_no_tool_calls() {
        let response = aggregate(&[
            StreamFragment::text("Hel"),
            StreamFragment::default(),
            StreamFragment::text("lo"),
        ]);
        assert_eq!(response.text, "Hello");
        assert!(!response.has_tool_calls());
    }

    #[test]
    fn empty_stream_yields_empty_response() {
        assert_eq!(aggregate(&[]), AggregatedResponse::default());
    }

    #[test]
    fn interleaved_indices_keep_their_own_slots() {
        let interleaved = aggregate(&[
            StreamFragment::tool_call(delta(0, Some("a"), Some("list_tables"), None)),
            StreamFragment::tool_call(delta(1, Some("b"), Some("get_table_schema"), None)),
            StreamFragment::tool_call(delta(1, None, None, Some("{\"collection_name\":"))),
            StreamFragment::tool_call(delta(0, None, None, Some("{}"))),
            StreamFragment::tool_call(delta(1, None, None, Some("\"users\"}"))),
        ]);
        let sequential = aggregate(&[
            StreamFragment::tool_call(delta(0, Some("a"), Some("list_tables"), None)),
            StreamFragment::tool_call(delta(0, None, None, Some("{}"))),
            StreamFragment::tool_call(delta(1, Some("b"), Some("get_table_schema"), None)),
            StreamFragment::tool_call(delta(1, None, None, Some("{\"collection_name\":"))),
            StreamFragment::tool_call(delta(1, None, None, Some("\"users\"}"))),
        ]);

        assert_eq!(interleaved, sequential);
        assert_eq!(interleaved.tool_calls[1].arguments, "{\"collection_name\":\"users\"}");
    }

    #[test]
    fn reordering_argument_chunks_changes_result() {
        let forward = aggregate(&[
            StreamFragment::tool_call(delta(0, Some("a"), Some("f"), Some("{\"k\":"))),
            StreamFragment::tool_call(delta(0, None, None, Some("\"v\"}"))),
        ]);
        let reversed = aggregate(&[
            StreamFragment::tool_call(delta(0, Some("a"), Some("f"), Some("\"v\"}"))),
            StreamFragment::tool_call(delta(0, None, None, Some("{\"k\":"))),
        ]);

        assert_ne!(forward.tool_calls[0].arguments, reversed.tool_calls[0].arguments);
        assert!(forward.tool_calls[0].parse_arguments().is_ok());
        assert!(reversed.tool_calls[0].parse_arguments().is_err());
    }

    #[test]
    fn sparse_index_skips_unnamed_slots() {
        let response = aggregate(&[
            StreamFragment::tool_call(delta(1, Some("c1"), Some("get_x"), Some("{}"))),
            StreamFragment::tool_call(delta(3, None, Some("list_tables"), None)),
        ]);

        assert_eq!(
            response.tool_calls,
            vec![
                ToolCallRequest {
                    id: "c1".to_string(),
                    name: "get_x".to_string(),
                    arguments: "{}".to_string(),
                },
                ToolCallRequest {
                    id: "tool-call-3".to_string(),
                    name: "list_tables".to_string(),
                    arguments: String::new(),
                },
            ]
        );
    }

    #[test]
    fn slot_without_name_is_dropped_even_with_arguments() {
        let response = aggregate(&[
            StreamFragment::tool_call(delta(0, Some("ghost"), None, Some("{\"n\":1}"))),
            StreamFragment::text("done"),
        ]);
        assert!(!response.has_tool_calls());
        assert_eq!(response.text, "done");
    }

    #[test]
    fn index_past_limit_is_rejected_without_growing() {
        let mut aggregator = StreamAggregator::new();
        aggregator
            .apply(&StreamFragment::tool_call(delta(0, Some("a"), Some("get_x"), None)))
            .expect("first slot");

        let err = aggregator
            .apply(&StreamFragment::tool_call(delta(
                u32::MAX as usize,
                None,
                None,
                Some("{}"),
            )))
            .expect_err("index is out of range");
        assert_eq!(err.index, u32::MAX as usize);
        assert_eq!(
            err.to_string(),
            format!(
                "Tool call index {} exceeds the limit of 128 calls per response",
                u32::MAX
            )
        );
        assert_eq!(aggregator.slots.len(), 1);

        let mut aggregator = StreamAggregator::new();
        aggregator
            .apply(&StreamFragment::tool_call(delta(
                MAX_TOOL_CALLS - 1,
                Some("last"),
                Some("get_x"),
                None,
            )))
            .expect("last slot is allowed");
        assert_eq!(aggregator.finish().tool_calls.len(), 1);
    }

    #[test]
    fn identifier_and_name_are_set_once() {
        let response = aggregate(&[
            StreamFragment::tool_call(delta(0, Some(""), Some(""), None)),
            StreamFragment::tool_call(delta(0, Some("first"), Some("list_tables"), None)),
            StreamFragment::tool_call(delta(0, Some("second"), Some("other"), None)),
            StreamFragment::tool_call(delta(0, Some(""), None, Some("{}"))),
        ]);

        assert_eq!(response.tool_calls[0].id, "first");
        assert_eq!(response.tool_calls[0].name, "list_tables");
    }

    #[test]
    fn blank_arguments_parse_as_empty_object() {
        let call = ToolCallRequest {
            id: "a".to_string(),
            name: "list_database_connections".to_string(),
            arguments: "  ".to_string(),
        };
        assert!(call.parse_arguments().expect("empty object").is_empty());
    }

    #[test]
    fn non_object_arguments_are_rejected() {
        let call = ToolCallRequest {
            id: "a".to_string(),
            name: "add".to_string(),
            arguments: "[1, 2]".to_string(),
        };
        let err = call.parse_arguments().expect_err("array is not an object");
        assert_eq!(err.to_string(), "Invalid arguments for add");
    }

    #[test]
    fn fragment_from_response_uses_first_choice() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"delta":{"content":"hi","tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"add","arguments":""}}]}}]}"#,
        )
        .expect("chunk");
        let fragment = StreamFragment::from_response(response);

        assert_eq!(fragment.content.as_deref(), Some("hi"));
        assert_eq!(
            fragment.tool_calls,
            vec![delta(0, Some("call_1"), Some("add"), Some(""))]
        );
    }
}
