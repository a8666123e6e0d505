//! Per-conversation bounded history.
//!
//! When a history grows past `cap` messages only the newest `retain` are
//! kept. Whole conversations are evicted when idle or when the number of
//! live conversations exceeds `max_conversations`; a conversation whose
//! turn lock is held or awaited is never evicted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::config::HistoryConfig;
use crate::message::Message;

/// Serializes turns within one conversation.
pub type TurnLock = Arc<tokio::sync::Mutex<()>>;

struct Slot {
    messages: Vec<Message>,
    last_used: Instant,
    turn_lock: TurnLock,
}

impl Slot {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            last_used: Instant::now(),
            turn_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Someone other than the slot holds the lock handle.
    fn busy(&self) -> bool {
        Arc::strong_count(&self.turn_lock) > 1
    }
}

/// In-memory conversation histories.
pub struct ConversationSession {
    cap: usize,
    retain: usize,
    max_conversations: usize,
    slots: Mutex<HashMap<String, Slot>>,
}

impl ConversationSession {
    /// `retain` is clamped into `1..cap`.
    pub fn new(config: &HistoryConfig) -> Self {
        let cap = config.cap.max(2);
        Self {
            cap,
            retain: config.retain.clamp(1, cap - 1),
            max_conversations: config.max_conversations.max(1),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Append a message, truncating past the cap.
    pub fn append(&self, conversation_id: &str, message: Message) {
        let mut slots = self.slots.lock();
        let slot = Self::slot_mut(&mut slots, conversation_id);
        slot.messages.push(message);
        slot.last_used = Instant::now();

        if slot.messages.len() > self.cap {
            let dropped = slot.messages.len() - self.retain;
            slot.messages.drain(..dropped);
            debug!(conversation_id, dropped, kept = self.retain, "Truncated history");
        }

        self.enforce_limit(&mut slots, conversation_id);
    }

    /// Snapshot of a conversation's history, oldest first.
    pub fn get(&self, conversation_id: &str) -> Vec<Message> {
        let mut slots = self.slots.lock();
        match slots.get_mut(conversation_id) {
            Some(slot) => {
                slot.last_used = Instant::now();
                slot.messages.clone()
            }
            None => Vec::new(),
        }
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.slots.lock().contains_key(conversation_id)
    }

    /// Forget a conversation's messages.
    pub fn clear(&self, conversation_id: &str) {
        let mut slots = self.slots.lock();
        let busy = slots.get(conversation_id).is_some_and(Slot::busy);
        if busy {
            if let Some(slot) = slots.get_mut(conversation_id) {
                slot.messages.clear();
            }
        } else {
            slots.remove(conversation_id);
        }
    }

    /// Seed an absent or empty history, keeping the newest `cap` messages.
    /// Returns whether anything was loaded.
    pub fn hydrate(&self, conversation_id: &str, mut messages: Vec<Message>) -> bool {
        if messages.is_empty() {
            return false;
        }

        let mut slots = self.slots.lock();
        let slot = Self::slot_mut(&mut slots, conversation_id);
        if !slot.messages.is_empty() {
            return false;
        }

        if messages.len() > self.cap {
            messages.drain(..messages.len() - self.cap);
        }
        slot.messages = messages;
        slot.last_used = Instant::now();
        self.enforce_limit(&mut slots, conversation_id);
        true
    }

    /// Lock handle for running a turn in this conversation.
    pub fn turn_lock(&self, conversation_id: &str) -> TurnLock {
        let mut slots = self.slots.lock();
        let lock = {
            let slot = Self::slot_mut(&mut slots, conversation_id);
            slot.last_used = Instant::now();
            slot.turn_lock.clone()
        };
        self.enforce_limit(&mut slots, conversation_id);
        lock
    }

    /// Evict conversations unused for at least `ttl`. Returns how many.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let mut slots = self.slots.lock();
        let before = slots.len();
        let now = Instant::now();
        slots.retain(|_, slot| slot.busy() || now.duration_since(slot.last_used) < ttl);
        let evicted = before - slots.len();
        if evicted > 0 {
            debug!(evicted, "Evicted idle conversations");
        }
        evicted
    }

    /// Number of conversations held in memory.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    fn slot_mut<'a>(slots: &'a mut HashMap<String, Slot>, conversation_id: &str) -> &'a mut Slot {
        slots
            .entry(conversation_id.to_string())
            .or_insert_with(Slot::new)
    }

    /// Drop least-recently-used idle conversations beyond the limit.
    fn enforce_limit(&self, slots: &mut HashMap<String, Slot>, keep: &str) {
        while slots.len() > self.max_conversations {
            let victim = slots
                .iter()
                .filter(|(id, slot)| id.as_str() != keep && !slot.busy())
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(id, _)| id.clone());

            match victim {
                Some(id) => {
                    slots.remove(&id);
                    debug!(conversation_id = %id, "Evicted least recently used conversation");
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn session(cap: usize, retain: usize, max_conversations: usize) -> ConversationSession {
        ConversationSession::new(&HistoryConfig {
            cap,
            retain,
            max_conversations,
            ..Default::default()
        })
    }

    fn texts(messages: &[Message]) -> Vec<String> {
        messages.iter().map(|m| m.content.clone()).collect()
    }

    fn numbered(range: std::ops::RangeInclusive<usize>) -> Vec<String> {
        range.map(|i| i.to_string()).collect()
    }

    #[test]
    fn test_truncates_to_retain_past_cap() {
        let session = session(4, 2, 16);
        for i in 1..=5 {
            session.append("c", Message::user(i.to_string()));
        }
        assert_eq!(texts(&session.get("c")), numbered(4..=5));
    }

    #[test]
    fn test_history_never_exceeds_cap_and_is_a_suffix() {
        let session = session(40, 30, 16);
        let total = 137;
        for i in 1..=total {
            session.append("c", Message::user(i.to_string()));
            let history = session.get("c");
            assert!(history.len() <= 40);
            assert_eq!(texts(&history), numbered(i + 1 - history.len()..=i));
        }
    }

    #[test]
    fn test_history_at_cap_holds_last_cap_messages() {
        // 4 fill, the 5th truncates to 2, three more refill to the cap.
        let session = session(4, 2, 16);
        for i in 1..=7 {
            session.append("c", Message::user(i.to_string()));
        }
        let history = session.get("c");
        assert_eq!(history.len(), 4);
        assert_eq!(texts(&history), numbered(4..=7));
    }

    #[test]
    fn test_conversations_are_independent() {
        let session = session(4, 2, 16);
        session.append("a", Message::user("a1"));
        session.append("b", Message::user("b1"));
        session.clear("a");
        assert!(session.get("a").is_empty());
        assert_eq!(texts(&session.get("b")), vec!["b1"]);
    }

    #[test]
    fn test_hydrate_keeps_newest_cap() {
        let session = session(4, 2, 16);
        let stored: Vec<_> = (1..=9).map(|i| Message::user(i.to_string())).collect();
        assert!(session.hydrate("c", stored.clone()));
        assert_eq!(texts(&session.get("c")), numbered(6..=9));

        // Existing history is not overwritten.
        assert!(!session.hydrate("c", stored));
    }

    #[test]
    fn test_lru_bound_evicts_oldest() {
        let session = session(4, 2, 2);
        session.append("a", Message::user("1"));
        std::thread::sleep(Duration::from_millis(2));
        session.append("b", Message::user("1"));
        std::thread::sleep(Duration::from_millis(2));
        session.append("c", Message::user("1"));

        assert_eq!(session.len(), 2);
        assert!(!session.contains("a"));
        assert!(session.contains("b"));
        assert!(session.contains("c"));
    }

    #[test]
    fn test_busy_conversation_survives_eviction() {
        let session = session(4, 2, 1);
        let lock = session.turn_lock("busy");
        session.append("busy", Message::user("1"));
        session.append("other", Message::user("1"));

        assert!(session.contains("busy"));
        assert_eq!(session.evict_idle(Duration::ZERO), 1);
        assert!(session.contains("busy"));
        assert!(!session.contains("other"));

        drop(lock);
        assert_eq!(session.evict_idle(Duration::ZERO), 1);
        assert!(session.is_empty());
    }

    #[test]
    fn test_clear_busy_conversation_keeps_lock() {
        let session = session(4, 2, 16);
        let lock = session.turn_lock("c");
        session.append("c", Message::user("1"));
        session.clear("c");
        assert!(session.get("c").is_empty());
        assert!(Arc::ptr_eq(&lock, &session.turn_lock("c")));
    }
}
