//! Per-session conversation memory and the session arena.
//!
//! Each session owns a bounded FIFO history of recent turns plus the
//! template anti-repeat markers. State is never shared across sessions:
//! the arena hands out one `Arc<tokio::Mutex<SessionState>>` per session
//! id, so a second in-flight turn for the same session queues on the
//! mutex instead of interleaving mutations, while turns for different
//! sessions proceed fully in parallel.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;

use crate::models::Turn;
use crate::template::TemplateMemory;

/// Maximum number of (user, assistant) turns retained per session.
pub const MAX_TURNS: usize = 6;

/// State owned exclusively by one conversation session.
#[derive(Debug, Default)]
pub struct SessionState {
    history: VecDeque<Turn>,
    /// Last template chosen per category, for anti-repeat selection.
    pub templates: TemplateMemory,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a turn, evicting the oldest when the history is full.
    pub fn append(&mut self, user_text: impl Into<String>, bot_text: impl Into<String>) {
        if self.history.len() == MAX_TURNS {
            self.history.pop_front();
        }
        self.history.push_back(Turn {
            user_text: user_text.into(),
            bot_text: bot_text.into(),
        });
    }

    /// Flatten current history into a chronological transcript, one
    /// user line and one assistant line per turn. Empty history renders
    /// as an empty block.
    pub fn render_history(&self) -> String {
        self.history
            .iter()
            .map(|t| format!("User: {}\nAssistant: {}", t.user_text, t.bot_text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

/// Process-wide registry of live sessions, keyed by session id.
///
/// The map itself sits behind a `std::sync::RwLock` (held only for the
/// lookup, never across an await); each state sits behind its own async
/// mutex so per-session turns serialize.
#[derive(Default)]
pub struct SessionArena {
    sessions: RwLock<HashMap<String, Arc<Mutex<SessionState>>>>,
}

impl SessionArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the state for `session_id`, creating it on first use.
    pub fn session(&self, session_id: &str) -> Arc<Mutex<SessionState>> {
        if let Some(state) = self.sessions.read().unwrap().get(session_id) {
            return state.clone();
        }
        let mut sessions = self.sessions.write().unwrap();
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(SessionState::new())))
            .clone()
    }

    /// Drop a session's state. Safe to call for unknown ids.
    pub fn end_session(&self, session_id: &str) {
        self.sessions.write().unwrap().remove(session_id);
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().unwrap().is_empty()
    }
}
