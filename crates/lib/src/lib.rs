//! agentloop core library: skill loading, the tool registry and built-in tools, the Ollama
//! model client, sessions, and the turn-loop engine used by the CLI.

pub mod agent;
pub mod agent_ctx;
pub mod config;
pub mod init;
pub mod llm;
pub mod message;
pub mod runtime;
pub mod session;
pub mod skills;
pub mod tools;

pub use agent::{Engine, EngineBuilder, EngineError, LoopState, TurnOutcome};
pub use message::{AssistantMessage, Message, ToolCall};
