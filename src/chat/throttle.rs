//! Per-chat throttle for streaming message edits

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Per-chat throttle for streaming message edits
///
/// Intermediate stream fragments are coalesced so Telegram sees at most one
/// edit per interval per chat. The final edit of an exchange bypasses the
/// throttle so the delivered text is always exact.
#[derive(Debug, Clone)]
pub struct EditThrottle {
    /// Minimum interval between edits per chat
    interval: Duration,
    /// Last edit timestamp per chat
    last_edit: Arc<Mutex<HashMap<i64, Instant>>>,
}

impl EditThrottle {
    /// Create a throttle with the given minimum interval between edits per chat
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_edit: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Check if an edit is allowed for the given chat. Returns true if allowed.
    pub fn check(&self, chat_id: i64) -> bool {
        let mut map = self.last_edit.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        if let Some(last) = map.get(&chat_id) {
            if now.duration_since(*last) < self.interval {
                return false;
            }
        }

        map.insert(chat_id, now);
        true
    }

    /// Forget throttle state for a chat (exchange finished)
    pub fn reset(&self, chat_id: i64) {
        let mut map = self.last_edit.lock().unwrap_or_else(|e| e.into_inner());
        map.remove(&chat_id);
    }
}
