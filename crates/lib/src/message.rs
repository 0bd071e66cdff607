//! Transcript messages exchanged between the engine, the model, and the tool registry.
//!
//! A transcript is an append-only `Vec<Message>`. Every [`ToolCall`] carried by an
//! assistant message is answered by exactly one [`Message::ToolResult`] with the same id
//! before the next assistant message.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Arguments passed to a tool: a JSON object keyed by parameter name.
pub type ToolArgs = Map<String, Value>;

/// One tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// Opaque correlation id; echoed back on the matching tool result.
    pub id: String,
    /// Registry name of the tool.
    pub tool_name: String,
    #[serde(default)]
    pub arguments: ToolArgs,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, tool_name: impl Into<String>, arguments: ToolArgs) -> Self {
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// Model output for one invocation. Empty `tool_calls` means "final answer".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantMessage {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            text: text.into(),
            tool_calls,
        }
    }
}

/// A single transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "camelCase")]
pub enum Message {
    System {
        text: String,
    },
    Human {
        text: String,
    },
    Assistant(AssistantMessage),
    #[serde(rename_all = "camelCase")]
    ToolResult {
        tool_call_id: String,
        text: String,
    },
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Message::System { text: text.into() }
    }

    pub fn human(text: impl Into<String>) -> Self {
        Message::Human { text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Message::Assistant(AssistantMessage::text(text))
    }

    pub fn tool_result(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Message::ToolResult {
            tool_call_id: tool_call_id.into(),
            text: text.into(),
        }
    }

    /// Text content regardless of variant.
    pub fn text(&self) -> &str {
        match self {
            Message::System { text } | Message::Human { text } => text,
            Message::Assistant(a) => &a.text,
            Message::ToolResult { text, .. } => text,
        }
    }

    /// Tool calls when this is an assistant message that requests tools; empty otherwise.
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Message::Assistant(a) => &a.tool_calls,
            _ => &[],
        }
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self, Message::Assistant(_))
    }
}

impl From<AssistantMessage> for Message {
    fn from(m: AssistantMessage) -> Self {
        Message::Assistant(m)
    }
}
