//! Conversation session store
//!
//! Keeps per-session conversation history and metadata in memory. Each
//! session owns an ordered log of user/assistant turns, capped at a
//! configurable length with FIFO truncation so that neither memory nor the
//! context sent to the external CLI grows without bound. Sessions live for
//! the lifetime of the process; an optional idle-eviction sweep can remove
//! sessions that have gone quiet (see [`SessionStore::evict_idle`]).
//!
//! The store is injected wherever it is needed (behind an `Arc`) rather
//! than living in a global; the mutex guards only the id-to-session map,
//! and no lock is held across await points.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

pub mod context;

/// Default cap on stored messages per session.
pub const DEFAULT_MAX_HISTORY: usize = 20;

/// A single conversation turn. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Who produced the message
    pub role: MessageRole,

    /// Message text
    pub content: String,

    /// When the message was appended
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Role of a conversation participant
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message sent by the remote client
    User,

    /// Reply produced by the external CLI
    Assistant,
}

impl MessageRole {
    /// Capitalized label used when rendering context for the external tool.
    pub fn capitalized(&self) -> &'static str {
        match self {
            MessageRole::User => "User",
            MessageRole::Assistant => "Assistant",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Session metadata snapshot returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    /// When the session was first seen
    pub created_at: DateTime<Utc>,

    /// When the session was last touched
    pub last_activity: DateTime<Utc>,
}

/// Internal per-session state. The history is owned exclusively by its
/// session; callers only ever see cloned snapshots.
#[derive(Debug)]
struct SessionState {
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    messages: Vec<Message>,
}

impl SessionState {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            last_activity: now,
            messages: Vec::new(),
        }
    }
}

/// In-memory store of conversation sessions keyed by opaque session id.
///
/// All operations are total over the id space: looking up an unknown id
/// creates it (or, for reads, yields an empty snapshot). Nothing here is
/// persisted across restarts.
#[derive(Debug)]
pub struct SessionStore {
    max_history: usize,
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl SessionStore {
    /// Create a store with the given per-session history cap.
    pub fn new(max_history: usize) -> Self {
        Self {
            max_history,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create the session, touching its last-activity timestamp.
    pub fn get_or_create(&self, session_id: &str) -> SessionInfo {
        let mut sessions = self.sessions.lock().expect("session map lock poisoned");
        let state = sessions
            .entry(session_id.to_string())
            .or_insert_with(SessionState::new);
        state.last_activity = Utc::now();
        SessionInfo {
            created_at: state.created_at,
            last_activity: state.last_activity,
        }
    }

    /// Append a message, creating the session if needed.
    ///
    /// Enforces the history cap by dropping the oldest messages first.
    pub fn append(&self, session_id: &str, role: MessageRole, content: impl Into<String>) {
        let mut sessions = self.sessions.lock().expect("session map lock poisoned");
        let state = sessions
            .entry(session_id.to_string())
            .or_insert_with(SessionState::new);
        state.last_activity = Utc::now();
        state.messages.push(Message::new(role, content));

        if state.messages.len() > self.max_history {
            let excess = state.messages.len() - self.max_history;
            state.messages.drain(..excess);
        }
    }

    /// Empty the session's history, preserving its metadata.
    pub fn clear(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().expect("session map lock poisoned");
        if let Some(state) = sessions.get_mut(session_id) {
            state.messages.clear();
            state.last_activity = Utc::now();
        }
    }

    /// Read-only snapshot of the session's history, oldest first.
    ///
    /// Unknown ids yield an empty snapshot without creating the session.
    pub fn history(&self, session_id: &str) -> Vec<Message> {
        let sessions = self.sessions.lock().expect("session map lock poisoned");
        sessions
            .get(session_id)
            .map(|state| state.messages.clone())
            .unwrap_or_default()
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        let sessions = self.sessions.lock().expect("session map lock poisoned");
        sessions.len()
    }

    /// Remove sessions idle for longer than `max_idle`. Returns how many
    /// were evicted.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_idle).unwrap_or_else(|_| chrono::Duration::zero());
        let mut sessions = self.sessions.lock().expect("session map lock poisoned");
        let before = sessions.len();
        sessions.retain(|_, state| state.last_activity >= cutoff);
        before - sessions.len()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}
