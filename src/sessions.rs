//! In-memory session store.
//!
//! A session carries everything that outlives a single request: the resolved
//! client role, the conversation, and generation-parameter overrides. Stored
//! in a concurrent map keyed by session id; the transport layer owns cookie
//! or token extraction and hands the runtime a bare id.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;

use crate::access::ResolvedRole;
use crate::engine::GenerationOverrides;
use crate::prompt::Conversation;

#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, SessionHandle>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.get(session_id).map(|entry| entry.clone())
    }

    pub fn get_or_create(&self, session_id: &str) -> SessionHandle {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionHandle::new(session_id))
            .clone()
    }

    pub fn remove(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.remove(session_id).map(|(_, handle)| handle)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Cheaply cloneable reference to one session's state.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionState>,
}

struct SessionState {
    id: String,
    role: parking_lot::Mutex<Option<ResolvedRole>>,
    // The conversation itself is behind an async mutex so handlers can hold
    // it across their own awaits; the outer slot lock is always short.
    conversation: parking_lot::Mutex<Option<Arc<AsyncMutex<Conversation>>>>,
    overrides: parking_lot::Mutex<GenerationOverrides>,
}

impl SessionHandle {
    fn new(id: &str) -> Self {
        Self {
            inner: Arc::new(SessionState {
                id: id.to_string(),
                role: parking_lot::Mutex::new(None),
                conversation: parking_lot::Mutex::new(None),
                overrides: parking_lot::Mutex::new(GenerationOverrides::default()),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn role(&self) -> Option<ResolvedRole> {
        self.inner.role.lock().clone()
    }

    pub fn set_role(&self, role: ResolvedRole) {
        *self.inner.role.lock() = Some(role);
    }

    /// Set the role only if none is bound yet (idempotent default grant).
    pub fn set_role_if_absent(&self, role: &ResolvedRole) {
        let mut slot = self.inner.role.lock();
        if slot.is_none() {
            *slot = Some(role.clone());
        }
    }

    pub fn conversation(&self) -> Option<Arc<AsyncMutex<Conversation>>> {
        self.inner.conversation.lock().clone()
    }

    pub fn conversation_or_init<F>(&self, init: F) -> Arc<AsyncMutex<Conversation>>
    where
        F: FnOnce() -> Conversation,
    {
        let mut slot = self.inner.conversation.lock();
        slot.get_or_insert_with(|| Arc::new(AsyncMutex::new(init()))).clone()
    }

    /// Drop the conversation (clear-context). Returns whether one existed.
    pub fn clear_conversation(&self) -> bool {
        self.inner.conversation.lock().take().is_some()
    }

    pub fn generation_overrides(&self) -> GenerationOverrides {
        *self.inner.overrides.lock()
    }

    pub fn set_generation_overrides(&self, overrides: GenerationOverrides) {
        *self.inner.overrides.lock() = overrides;
    }
}
