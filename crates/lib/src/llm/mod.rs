//! Model abstraction and Ollama client.
//!
//! The engine only sees [`Model`]: given the transcript so far and the available tools, return
//! exactly one assistant message.

mod ollama;

use async_trait::async_trait;

use crate::message::{AssistantMessage, Message};
use crate::tools::ToolSpec;

pub use ollama::{
    ChatMessage, ChatResponse, OllamaClient, OllamaModel, OllamaModelInfo, ToolDefinition,
    ToolFunctionDefinition, DEFAULT_BASE_URL,
};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Request(String),
    #[error("model api error: {0}")]
    Api(String),
    #[error("model response could not be decoded: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ModelError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ModelError::Decode(e.to_string())
        } else {
            ModelError::Request(e.to_string())
        }
    }
}

/// A chat model that may request tool calls. Shared across sessions; must be callable
/// concurrently and with any prefix of a transcript.
#[async_trait]
pub trait Model: Send + Sync {
    async fn invoke(
        &self,
        transcript: &[Message],
        tools: &[ToolSpec],
    ) -> Result<AssistantMessage, ModelError>;
}
