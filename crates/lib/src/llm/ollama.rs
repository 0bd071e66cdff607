//! Ollama API client (http://127.0.0.1:11434 by default).
//! Non-streaming chat with function calling, and model listing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Model, ModelError};
use crate::message::{AssistantMessage, Message, ToolArgs, ToolCall};
use crate::tools::ToolSpec;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";

/// Client for Ollama HTTP API.
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET /api/tags: list available models.
    pub async fn list_models(&self) -> Result<Vec<OllamaModelInfo>, ModelError> {
        let url = format!("{}/api/tags", self.base_url);
        let res = self.client.get(&url).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ModelError::Api(format!("{} {}", status, body)));
        }
        let data: TagsResponse = res.json().await?;
        Ok(data.models.unwrap_or_default())
    }

    /// POST /api/chat: non-streaming chat completion with optional tools.
    pub async fn chat(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<ChatResponse, ModelError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model: model.to_string(),
            messages,
            stream: false,
            tools,
        };
        let res = self.client.post(&url).json(&body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ModelError::Api(format!("{} {}", status, body)));
        }
        Ok(res.json().await?)
    }
}

/// An Ollama client bound to one model name; implements [`Model`].
#[derive(Clone)]
pub struct OllamaModel {
    client: OllamaClient,
    model: String,
}

impl OllamaModel {
    pub fn new(client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Model for OllamaModel {
    async fn invoke(
        &self,
        transcript: &[Message],
        tools: &[ToolSpec],
    ) -> Result<AssistantMessage, ModelError> {
        let messages = to_chat_messages(transcript);
        let tools = if tools.is_empty() {
            None
        } else {
            Some(tools.iter().map(ToolDefinition::from).collect())
        };
        let res = self.client.chat(&self.model, messages, tools).await?;
        let message = res
            .message
            .ok_or_else(|| ModelError::Decode("response has no message".to_string()))?;
        Ok(from_chat_message(message))
    }
}

/// Map the transcript to Ollama roles. Tool results carry the tool name, looked up from the
/// assistant call with the same id.
fn to_chat_messages(transcript: &[Message]) -> Vec<ChatMessage> {
    let mut out = Vec::with_capacity(transcript.len());
    for (i, m) in transcript.iter().enumerate() {
        let msg = match m {
            Message::System { text } => ChatMessage::plain("system", text),
            Message::Human { text } => ChatMessage::plain("user", text),
            Message::Assistant(a) => ChatMessage {
                role: "assistant".to_string(),
                content: a.text.clone(),
                tool_calls: if a.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        a.tool_calls
                            .iter()
                            .map(|c| OllamaToolCall {
                                typ: "function".to_string(),
                                function: OllamaToolCallFunction {
                                    index: None,
                                    name: c.tool_name.clone(),
                                    arguments: Value::Object(c.arguments.clone()),
                                },
                            })
                            .collect(),
                    )
                },
                tool_name: None,
            },
            Message::ToolResult { tool_call_id, text } => ChatMessage {
                role: "tool".to_string(),
                content: text.clone(),
                tool_calls: None,
                tool_name: transcript[..i]
                    .iter()
                    .rev()
                    .flat_map(|m| m.tool_calls())
                    .find(|c| &c.id == tool_call_id)
                    .map(|c| c.tool_name.clone()),
            },
        };
        out.push(msg);
    }
    out
}

/// Ollama does not assign call ids; each call gets a fresh `call_<uuid>`.
fn from_chat_message(message: ChatMessage) -> AssistantMessage {
    let tool_calls = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|c| {
            ToolCall::new(
                format!("call_{}", uuid::Uuid::new_v4().simple()),
                c.function.name.clone(),
                arguments_to_map(&c.function.name, c.function.arguments),
            )
        })
        .collect();
    AssistantMessage {
        text: message.content,
        tool_calls,
    }
}

/// Arguments arrive as an object or a JSON-encoded string depending on the model.
fn arguments_to_map(tool: &str, arguments: Value) -> ToolArgs {
    match arguments {
        Value::Object(map) => map,
        Value::Null => ToolArgs::new(),
        Value::String(s) if s.trim().is_empty() => ToolArgs::new(),
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(Value::Object(map)) => map,
            _ => {
                log::warn!("ollama: tool {} arguments are not a JSON object: {}", tool, s);
                ToolArgs::new()
            }
        },
        other => {
            log::warn!("ollama: tool {} arguments are not an object: {}", tool, other);
            ToolArgs::new()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaModelInfo {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Option<Vec<OllamaModelInfo>>,
}

/// One tool/function call in an assistant message (Ollama format).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaToolCall {
    #[serde(rename = "type", default)]
    typ: String,
    function: OllamaToolCallFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaToolCallFunction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    index: Option<u32>,
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OllamaToolCall>>,
    /// When role is "tool", the name of the tool this result is for (Ollama expects "tool_name").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl ChatMessage {
    fn plain(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
            tool_calls: None,
            tool_name: None,
        }
    }
}

/// Tool definition for Ollama chat (function-calling).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub typ: String,
    pub function: ToolFunctionDefinition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolFunctionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

impl From<&ToolSpec> for ToolDefinition {
    fn from(spec: &ToolSpec) -> Self {
        ToolDefinition {
            typ: "function".to_string(),
            function: ToolFunctionDefinition {
                name: spec.name.clone(),
                description: if spec.description.is_empty() {
                    None
                } else {
                    Some(spec.description.clone())
                },
                parameters: spec.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDefinition>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub message: Option<ChatMessage>,
    #[serde(default)]
    pub done: bool,
}
