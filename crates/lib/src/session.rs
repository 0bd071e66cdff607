//! Conversation sessions keyed by caller-supplied thread id.
//!
//! A session is a transcript plus the number of model turns taken. The engine is the only
//! writer; stores persist whole sessions or append batches. [`MemorySessionStore`] keeps
//! everything in process memory.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::message::Message;

/// Opaque conversation identifier supplied by the caller.
pub type ThreadId = String;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub thread_id: ThreadId,
    pub transcript: Vec<Message>,
    /// Model invocations recorded in the transcript (one per assistant message).
    pub turn_count: u32,
}

impl Session {
    pub fn new(thread_id: impl Into<ThreadId>) -> Self {
        Self {
            thread_id: thread_id.into(),
            transcript: Vec::new(),
            turn_count: 0,
        }
    }

    /// Session starting from an existing transcript.
    pub fn seeded(thread_id: impl Into<ThreadId>, transcript: Vec<Message>) -> Self {
        let mut s = Self::new(thread_id);
        s.extend(transcript);
        s
    }

    /// Append messages, counting assistant messages as turns.
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        for m in messages {
            if m.is_assistant() {
                self.turn_count += 1;
            }
            self.transcript.push(m);
        }
    }

    pub fn last(&self) -> Option<&Message> {
        self.transcript.last()
    }

    /// True before the first model call: exactly one human message and no assistant yet.
    pub fn is_first_turn(&self) -> bool {
        let humans = self
            .transcript
            .iter()
            .filter(|m| matches!(m, Message::Human { .. }))
            .count();
        humans == 1 && !self.transcript.iter().any(Message::is_assistant)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("session store error: {0}")]
    Backend(String),
}

pub(crate) fn new_thread_id() -> ThreadId {
    format!("thread-{}", uuid::Uuid::new_v4())
}

/// Persistence for sessions. Implementations must be safe to share across tasks.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, thread_id: &str) -> Result<Option<Session>, StoreError>;

    /// Return the session, creating an empty one if it does not exist.
    async fn get_or_create(&self, thread_id: &str) -> Result<Session, StoreError>;

    /// Insert or replace a whole session.
    async fn save(&self, session: &Session) -> Result<(), StoreError>;

    /// Append a batch to an existing session and return the updated session.
    async fn append(&self, thread_id: &str, messages: Vec<Message>) -> Result<Session, StoreError>;

    /// Remove a session; returns whether it existed.
    async fn remove(&self, thread_id: &str) -> Result<bool, StoreError>;

    async fn list(&self) -> Result<Vec<ThreadId>, StoreError>;

    /// Create an empty session with a generated id.
    async fn create(&self) -> Result<ThreadId, StoreError> {
        let id = new_thread_id();
        self.get_or_create(&id).await?;
        Ok(id)
    }
}

/// In-memory store; contents live as long as the process.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<RwLock<HashMap<ThreadId, Session>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, thread_id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.inner.read().await.get(thread_id).cloned())
    }

    async fn get_or_create(&self, thread_id: &str) -> Result<Session, StoreError> {
        if let Some(s) = self.inner.read().await.get(thread_id) {
            return Ok(s.clone());
        }
        let mut g = self.inner.write().await;
        Ok(g.entry(thread_id.to_string())
            .or_insert_with(|| Session::new(thread_id))
            .clone())
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .insert(session.thread_id.clone(), session.clone());
        Ok(())
    }

    async fn append(&self, thread_id: &str, messages: Vec<Message>) -> Result<Session, StoreError> {
        let mut g = self.inner.write().await;
        let session = g
            .get_mut(thread_id)
            .ok_or_else(|| StoreError::NotFound(thread_id.to_string()))?;
        session.extend(messages);
        Ok(session.clone())
    }

    async fn remove(&self, thread_id: &str) -> Result<bool, StoreError> {
        Ok(self.inner.write().await.remove(thread_id).is_some())
    }

    async fn list(&self) -> Result<Vec<ThreadId>, StoreError> {
        let mut ids: Vec<ThreadId> = self.inner.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
