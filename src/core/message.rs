use crate::api::{ChatMessage, ChatToolCall, ChatToolCallFunction};
use crate::core::aggregator::ToolCallRequest;

pub const ROLE_SYSTEM: &str = "system";
pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";
pub const ROLE_TOOL: &str = "tool";

/// One entry of a session's conversation history.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    System(String),
    User(String),
    /// Free text, or a batch of tool calls; never both.
    Assistant(AssistantReply),
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssistantReply {
    Text(String),
    ToolCalls(Vec<ToolCallRequest>),
}

impl Message {
    pub fn role(&self) -> &'static str {
        match self {
            Message::System(_) => ROLE_SYSTEM,
            Message::User(_) => ROLE_USER,
            Message::Assistant(_) => ROLE_ASSISTANT,
            Message::Tool { .. } => ROLE_TOOL,
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Message::Assistant(AssistantReply::Text(text.into()))
    }

    pub fn to_api_message(&self) -> ChatMessage {
        let role = self.role().to_string();
        match self {
            Message::System(text) | Message::User(text) => ChatMessage {
                role,
                content: Some(text.clone()),
                tool_call_id: None,
                tool_calls: None,
            },
            Message::Assistant(AssistantReply::Text(text)) => ChatMessage {
                role,
                content: Some(text.clone()),
                tool_call_id: None,
                tool_calls: None,
            },
            Message::Assistant(AssistantReply::ToolCalls(calls)) => ChatMessage {
                role,
                content: None,
                tool_call_id: None,
                tool_calls: Some(calls.iter().map(to_api_tool_call).collect()),
            },
            Message::Tool {
                tool_call_id,
                content,
            } => ChatMessage {
                role,
                content: Some(content.clone()),
                tool_call_id: Some(tool_call_id.clone()),
                tool_calls: None,
            },
        }
    }
}

fn to_api_tool_call(call: &ToolCallRequest) -> ChatToolCall {
    ChatToolCall {
        id: call.id.clone(),
        kind: "function".to_string(),
        function: ChatToolCallFunction {
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        },
    }
}

pub fn to_api_messages(history: &[Message]) -> Vec<ChatMessage> {
    history.iter().map(Message::to_api_message).collect()
}
