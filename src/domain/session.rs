//! SessionExchange - ordered short-term memory for one session
//!
//! Bounded by count and total characters; exchanges within one session are
//! appended in request arrival order.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use taskstore::{IndexValue, Record, now_ms};

/// Default cap on exchanges retained per session.
pub const MAX_EXCHANGES: usize = 50;
/// Default cap on total characters retained per session.
pub const MAX_TOTAL_CHARS: usize = 20_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    pub user: String,
    pub assistant: String,
    pub at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionExchange {
    pub id: String,
    pub session_id: String,
    pub exchanges: Vec<Exchange>,
    pub updated_at: i64,
}

impl SessionExchange {
    pub fn new(session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        Self {
            id: format!("session-{session_id}"),
            session_id,
            exchanges: Vec::new(),
            updated_at: now_ms(),
        }
    }

    /// Append one (user, assistant) pair, enforcing the count and character
    /// bounds by dropping the oldest exchanges first.
    pub fn append(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.exchanges.push(Exchange {
            user: user.into(),
            assistant: assistant.into(),
            at: now_ms(),
        });
        self.updated_at = now_ms();
        self.enforce_bounds();
    }

    fn total_chars(&self) -> usize {
        self.exchanges.iter().map(|e| e.user.len() + e.assistant.len()).sum()
    }

    fn enforce_bounds(&mut self) {
        while self.exchanges.len() > MAX_EXCHANGES {
            self.exchanges.remove(0);
        }
        while self.total_chars() > MAX_TOTAL_CHARS && !self.exchanges.is_empty() {
            self.exchanges.remove(0);
        }
    }

    /// Last `n` exchanges, oldest first, for context assembly.
    pub fn last_n(&self, n: usize) -> &[Exchange] {
        let start = self.exchanges.len().saturating_sub(n);
        &self.exchanges[start..]
    }
}

impl Record for SessionExchange {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "session_exchanges"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("session_id".to_string(), IndexValue::String(self.session_id.clone()));
        fields
    }
}
