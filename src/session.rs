use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::debug;

use crate::types::ChatMessage;

/// Session id used when a request does not name one.
pub const DEFAULT_SESSION: &str = "default";

/// Bounded conversation memory for one session. Holds at most
/// `2 * max_exchanges` messages; the oldest are dropped first.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    messages: VecDeque<ChatMessage>,
    max_exchanges: usize,
}

impl ConversationHistory {
    pub fn new(max_exchanges: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(max_exchanges * 2),
            max_exchanges,
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_exchanges * 2
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push_back(message);
        while self.messages.len() > self.capacity() {
            self.messages.pop_front();
        }
    }

    /// Record what the user asked and what they were shown.
    pub fn record_exchange(&mut self, user: &str, assistant: &str) {
        self.push(ChatMessage::user(user));
        self.push(ChatMessage::assistant(assistant));
    }

    pub fn messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

pub type SharedHistory = Arc<Mutex<ConversationHistory>>;

/// Sessions kept before the least recently used one is evicted.
pub const DEFAULT_MAX_SESSIONS: usize = 1000;

struct SessionEntry {
    history: SharedHistory,
    last_used: Instant,
}

/// Per-session histories. Turns on the same session serialize on that
/// session's lock; different sessions never contend. The number of sessions
/// is capped; at the cap the idlest session is dropped to make room.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    max_exchanges: usize,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(max_exchanges: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_exchanges,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    /// History for `session_id`, created empty on first use.
    pub async fn get_or_create(&self, session_id: &str) -> SharedHistory {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();

        if let Some(entry) = sessions.get_mut(session_id) {
            entry.last_used = now;
            return entry.history.clone();
        }

        if sessions.len() >= self.max_sessions {
            let idlest = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(id, _)| id.clone());
            if let Some(id) = idlest {
                sessions.remove(&id);
                debug!(session = %id, "evicted idle conversation session");
            }
        }

        debug!(session = session_id, "new conversation session");
        let history = Arc::new(Mutex::new(ConversationHistory::new(self.max_exchanges)));
        sessions.insert(
            session_id.to_string(),
            SessionEntry {
                history: history.clone(),
                last_used: now,
            },
        );
        history
    }

    /// Forget a session. Unknown sessions are a no-op.
    pub async fn clear(&self, session_id: &str) {
        if self.sessions.lock().await.remove(session_id).is_some() {
            debug!(session = session_id, "conversation history cleared");
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}
