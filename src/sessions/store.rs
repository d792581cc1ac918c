//! In-memory session store
//!
//! Keyed storage of ordered chat histories. Each session has its own
//! lock so concurrent requests for different ids never contend; the
//! read-modify-append sequence for a single id is atomic. Locks are
//! only held for in-memory work, never across a network call.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a chat message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// User-sent message
    #[default]
    User,
    /// Assistant response
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// An image attached to a chat message. `data` is base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAttachment {
    pub mime_type: String,
    pub data: String,
}

impl ImageAttachment {
    /// Approximate decoded size in bytes (base64 expands 3 bytes to 4 chars).
    pub fn approx_size_bytes(&self) -> usize {
        self.data.len() / 4 * 3
    }
}

/// A message in a session's history. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message identifier
    pub id: String,
    /// Role of the sender
    pub role: MessageRole,
    /// Message content
    pub content: String,
    /// Timestamp when the message was created
    pub timestamp: DateTime<Utc>,
    /// Attached images, if any
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageAttachment>,
}

impl ChatMessage {
    /// Create a new chat message
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            images: Vec::new(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Attach images
    pub fn with_images(mut self, images: Vec<ImageAttachment>) -> Self {
        self.images = images;
        self
    }
}

/// Result of atomically appending a user message: the derived turn
/// number (count of user messages including this one) and the history
/// as it stood *before* the append.
#[derive(Debug, Clone)]
pub struct UserTurn {
    pub turn: usize,
    pub prior: Vec<ChatMessage>,
}

#[derive(Debug, Default)]
struct SessionEntry {
    messages: Vec<ChatMessage>,
    issue_requested: bool,
}

/// Keyed in-memory store of session histories.
///
/// The outer map lock is only held long enough to fetch or create the
/// per-session entry; all history work happens under that session's own
/// mutex, so independent ids never block each other.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<SessionEntry>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the entry for `session_id`, creating it if absent.
    fn entry(&self, session_id: &str) -> Arc<Mutex<SessionEntry>> {
        if let Some(entry) = self.sessions.read().get(session_id) {
            return entry.clone();
        }
        let mut sessions = self.sessions.write();
        sessions
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    /// Atomically append a user message and derive the turn number.
    ///
    /// The returned [`UserTurn::prior`] excludes the message just
    /// appended, matching what the AI adapter expects as history.
    pub fn append_user(&self, session_id: &str, message: ChatMessage) -> UserTurn {
        let entry = self.entry(session_id);
        let mut guard = entry.lock();
        let prior = guard.messages.clone();
        guard.messages.push(message);
        let turn = guard
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .count();
        UserTurn { turn, prior }
    }

    /// Append a message (creating the session if absent) and return the
    /// full history snapshot including it.
    pub fn append(&self, session_id: &str, message: ChatMessage) -> Vec<ChatMessage> {
        let entry = self.entry(session_id);
        let mut guard = entry.lock();
        guard.messages.push(message);
        guard.messages.clone()
    }

    /// Ordered history for a session. Unknown ids yield an empty vec,
    /// not an error; callers distinguish "no session" only by this.
    pub fn messages(&self, session_id: &str) -> Vec<ChatMessage> {
        let entry = { self.sessions.read().get(session_id).cloned() };
        match entry {
            Some(entry) => entry.lock().messages.clone(),
            None => Vec::new(),
        }
    }

    /// Delete a session. Idempotent; unknown ids are a no-op.
    pub fn delete(&self, session_id: &str) {
        self.sessions.write().remove(session_id);
    }

    /// Acquire the per-session one-shot issue flag.
    ///
    /// Returns `true` exactly once per session; every later call (and
    /// any concurrent call that loses the race) returns `false`.
    pub fn request_issue_once(&self, session_id: &str) -> bool {
        let entry = self.entry(session_id);
        let mut guard = entry.lock();
        if guard.issue_requested {
            false
        } else {
            guard.issue_requested = true;
            true
        }
    }

    /// Whether the issue flag has been set for a session.
    pub fn issue_requested(&self, session_id: &str) -> bool {
        let entry = { self.sessions.read().get(session_id).cloned() };
        entry.map(|e| e.lock().issue_requested).unwrap_or(false)
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}
