//! Agent turn loop: call the model, run any requested tools, feed results back, repeat until
//! the model answers without tool calls.
//!
//! The transcript is only committed at consistent points: an assistant message without tool
//! calls on its own, or an assistant message together with every one of its tool results.
//! A step that fails or times out commits nothing, so the session can be resumed later.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

use crate::llm::{Model, ModelError};
use crate::message::{AssistantMessage, Message, ToolCall};
use crate::session::{MemorySessionStore, Session, SessionStore, StoreError, ThreadId};
use crate::tools::{ToolRegistry, ToolSpec};

pub const DEFAULT_MAX_TURNS: u32 = 25;

/// Where a conversation stands, derived from its last message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingModel,
    AwaitingTools,
    Done,
}

impl LoopState {
    pub fn of(transcript: &[Message]) -> Self {
        transcript.last().map(route).unwrap_or(LoopState::AwaitingModel)
    }
}

/// The routing rule: only the most recent message decides. An assistant message with at least
/// one tool call goes to tool execution; any other assistant message (including an empty
/// tool-call list) ends the loop. Anything else still needs the model.
pub fn route(last: &Message) -> LoopState {
    match last {
        Message::Assistant(a) if !a.tool_calls.is_empty() => LoopState::AwaitingTools,
        Message::Assistant(_) => LoopState::Done,
        _ => LoopState::AwaitingModel,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine misconfigured: {0}")]
    Config(&'static str),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("no reply within {0:?}")]
    Timeout(Duration),
    #[error("turn limit reached: {0} model calls without a final answer")]
    TurnLimit(u32),
    #[error("session {0} has no messages")]
    EmptySession(ThreadId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of driving a session to completion.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub thread_id: ThreadId,
    /// Text of the final assistant message.
    pub reply: String,
    pub transcript: Vec<Message>,
    /// Model calls made during this drive.
    pub model_calls: u32,
}

#[derive(Default)]
pub struct EngineBuilder {
    model: Option<Arc<dyn Model>>,
    tools: Option<Arc<ToolRegistry>>,
    store: Option<Arc<dyn SessionStore>>,
    system_prompt: Option<String>,
    max_turns: Option<u32>,
    reply_timeout: Option<Duration>,
}

impl EngineBuilder {
    pub fn model(mut self, model: Arc<dyn Model>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Defaults to a fresh [`MemorySessionStore`].
    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// One-time system message injected before the first model call of each session.
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.system_prompt = if prompt.trim().is_empty() {
            None
        } else {
            Some(prompt)
        };
        self
    }

    /// Maximum model calls per drive; `None` disables the limit.
    pub fn max_turns(mut self, max_turns: Option<u32>) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Deadline for producing a reply: covers every model and tool cycle of one drive until Done.
    pub fn reply_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<Engine, EngineError> {
        let model = self.model.ok_or(EngineError::Config("no model configured"))?;
        let tools = self
            .tools
            .ok_or(EngineError::Config("no tool registry configured"))?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemorySessionStore::new()));
        Ok(Engine {
            model,
            tool_specs: tools.specs(),
            tools,
            store,
            system_prompt: self.system_prompt,
            max_turns: self.max_turns,
            reply_timeout: self.reply_timeout,
            locks: StdMutex::new(HashMap::new()),
        })
    }
}

/// Drives sessions through the model/tool loop. Shareable across tasks; each thread id is
/// served by at most one drive at a time.
pub struct Engine {
    model: Arc<dyn Model>,
    tools: Arc<ToolRegistry>,
    tool_specs: Vec<ToolSpec>,
    store: Arc<dyn SessionStore>,
    system_prompt: Option<String>,
    max_turns: Option<u32>,
    reply_timeout: Option<Duration>,
    locks: StdMutex<HashMap<ThreadId, Arc<Mutex<()>>>>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Append a human message to the thread (creating it if needed) and drive to Done.
    pub async fn send(&self, thread_id: &str, text: &str) -> Result<TurnOutcome, EngineError> {
        let _lease = self.lease(thread_id).await;
        let mut session = self.store.get_or_create(thread_id).await?;
        session.extend([Message::human(text)]);
        self.store.save(&session).await?;
        self.drive(session).await
    }

    /// Drive a stored thread from wherever it stands (e.g. after a timeout or model error).
    pub async fn resume(&self, thread_id: &str) -> Result<TurnOutcome, EngineError> {
        let _lease = self.lease(thread_id).await;
        let session = self
            .store
            .load(thread_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(thread_id.to_string()))?;
        self.drive(session).await
    }

    /// Current transcript of a thread; reading never changes it.
    pub async fn transcript(&self, thread_id: &str) -> Result<Vec<Message>, EngineError> {
        Ok(self
            .store
            .load(thread_id)
            .await?
            .map(|s| s.transcript)
            .unwrap_or_default())
    }

    pub async fn state(&self, thread_id: &str) -> Result<LoopState, EngineError> {
        Ok(LoopState::of(&self.transcript(thread_id).await?))
    }

    /// Forget a thread. Waits for a drive in flight on it to finish first.
    pub async fn end(&self, thread_id: &str) -> Result<bool, EngineError> {
        let _lease = self.lease(thread_id).await;
        Ok(self.store.remove(thread_id).await?)
    }

    /// Exclusive access to one thread until the lease is dropped.
    async fn lease(&self, thread_id: &str) -> ThreadLease<'_> {
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(thread_id.to_string())
            .or_default()
            .clone();
        let guard = lock.clone().lock_owned().await;
        ThreadLease {
            engine: self,
            thread_id: thread_id.to_string(),
            lock,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn held_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    async fn drive(&self, mut session: Session) -> Result<TurnOutcome, EngineError> {
        if session.transcript.is_empty() {
            return Err(EngineError::EmptySession(session.thread_id));
        }
        if self.inject_system_prompt(&mut session) {
            log::debug!("agent: injected system prompt into {}", session.thread_id);
            self.store.save(&session).await?;
        }

        let thread_id = session.thread_id.clone();
        let deadline = self.reply_timeout.map(|t| Instant::now() + t);
        let mut model_calls = 0u32;
        let mut pending: Option<AssistantMessage> = None;
        let mut state = LoopState::of(&session.transcript);

        loop {
            match state {
                LoopState::AwaitingModel => {
                    if let Some(max) = self.max_turns {
                        if model_calls >= max {
                            log::warn!("agent: {} hit turn limit ({})", thread_id, max);
                            return Err(EngineError::TurnLimit(max));
                        }
                    }
                    let reply = self
                        .bounded(deadline, self.model.invoke(&session.transcript, &self.tool_specs))
                        .await??;
                    model_calls += 1;
                    let msg = Message::Assistant(reply);
                    state = route(&msg);
                    match msg {
                        Message::Assistant(reply) if state == LoopState::AwaitingTools => {
                            pending = Some(reply);
                        }
                        msg => {
                            session = self.store.append(&thread_id, vec![msg]).await?;
                        }
                    }
                }
                LoopState::AwaitingTools => {
                    let mut batch = Vec::new();
                    let calls: Vec<ToolCall> = match pending.take() {
                        Some(reply) => {
                            let calls = reply.tool_calls.clone();
                            batch.push(Message::Assistant(reply));
                            calls
                        }
                        // Stored transcript ends with unanswered calls.
                        None => session
                            .last()
                            .map(|m| m.tool_calls().to_vec())
                            .unwrap_or_default(),
                    };
                    let results = self.bounded(deadline, self.dispatch(&calls)).await?;
                    batch.extend(results);
                    session = self.store.append(&thread_id, batch).await?;
                    state = LoopState::AwaitingModel;
                }
                LoopState::Done => break,
            }
        }

        let reply = session.last().map(|m| m.text().to_string()).unwrap_or_default();
        Ok(TurnOutcome {
            thread_id,
            reply,
            transcript: session.transcript,
            model_calls,
        })
    }

    /// Put the system prompt first, once per session, before the first model call. A caller-
    /// supplied leading system message is kept after the prompt.
    fn inject_system_prompt(&self, session: &mut Session) -> bool {
        let Some(prompt) = self.system_prompt.as_deref() else {
            return false;
        };
        if !session.is_first_turn() {
            return false;
        }
        match session.transcript.first_mut() {
            Some(Message::System { text }) if text.starts_with(prompt) => false,
            Some(Message::System { text }) => {
                *text = format!("{}\n\n{}", prompt, text);
                true
            }
            _ => {
                session.transcript.insert(0, Message::system(prompt));
                true
            }
        }
    }

    /// Run every call concurrently; results come back in call order.
    async fn dispatch(&self, calls: &[ToolCall]) -> Vec<Message> {
        let runs = calls.iter().map(|call| async move {
            log::debug!("agent: tool {} ({})", call.tool_name, call.id);
            let text = match self.tools.invoke(call).await {
                Ok(out) => out,
                Err(e) => {
                    log::warn!("agent: tool {} failed: {}", call.tool_name, e);
                    format!("Error: {}", e)
                }
            };
            Message::tool_result(call.id.clone(), text)
        });
        join_all(runs).await
    }

    async fn bounded<F: Future>(
        &self,
        deadline: Option<Instant>,
        fut: F,
    ) -> Result<F::Output, EngineError> {
        match deadline {
            Some(d) => tokio::time::timeout_at(d, fut).await.map_err(|_| {
                let limit = self.reply_timeout.unwrap_or_default();
                log::warn!("agent: no reply within {:?}", limit);
                EngineError::Timeout(limit)
            }),
            None => Ok(fut.await),
        }
    }
}

/// Holds a thread's lock. On drop the lock is released, and its map entry is removed when no
/// other lease holds or awaits it. Entries are only cloned under the map lock, so a removed
/// entry can never still be in use.
struct ThreadLease<'a> {
    engine: &'a Engine,
    thread_id: ThreadId,
    lock: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ThreadLease<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self
            .engine
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let idle = locks
            .get(&self.thread_id)
            .is_some_and(|l| Arc::ptr_eq(l, &self.lock) && Arc::strong_count(l) == 2);
        if idle {
            locks.remove(&self.thread_id);
        }
    }
}
