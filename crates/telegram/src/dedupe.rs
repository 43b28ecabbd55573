//! Voice-send deduplication.
//!
//! A process-wide map of `accountId:chatId` → per-chat fingerprint window.
//! Both maps are insertion-ordered by last touch, so eviction is plain LRU:
//! chats beyond 500 drop from the head, fingerprints beyond 50 per chat
//! likewise, and expired fingerprints are pruned lazily from the head on
//! access.

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

const MAX_CHATS: usize = 500;
const MAX_FINGERPRINTS_PER_CHAT: usize = 50;
pub const DEFAULT_WINDOW_MS: u64 = 10_000;

/// sha256 hex over the voice payload bytes.
pub fn voice_fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Insertion-ordered map (small, bounded — linear ops are fine)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct OrderedMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> OrderedMap<V> {
    fn new() -> Self {
        Self { entries: Vec::new() }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    /// Move an existing key to the tail, returning whether it was present.
    fn touch(&mut self, key: &str) -> bool {
        if let Some(idx) = self.entries.iter().position(|(k, _)| k == key) {
            let entry = self.entries.remove(idx);
            self.entries.push(entry);
            true
        } else {
            false
        }
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    fn insert_tail(&mut self, key: String, value: V) {
        self.entries.push((key, value));
    }

    fn evict_head_while(&mut self, max: usize) {
        while self.entries.len() > max {
            self.entries.remove(0);
        }
    }

    /// Drop head entries while `pred` holds; stops at the first survivor.
    fn prune_head_while(&mut self, mut pred: impl FnMut(&V) -> bool) {
        while let Some((_, v)) = self.entries.first() {
            if pred(v) {
                self.entries.remove(0);
            } else {
                break;
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Deduper
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct FingerprintEntry {
    ts: u64,
}

pub struct VoiceDeduper {
    chats: Mutex<OrderedMap<OrderedMap<FingerprintEntry>>>,
    default_window_ms: u64,
}

impl VoiceDeduper {
    pub fn new(default_window_ms: u64) -> Self {
        Self {
            chats: Mutex::new(OrderedMap::new()),
            default_window_ms,
        }
    }

    /// Whether a send with this fingerprint is a duplicate within the
    /// sliding window.  A non-duplicate is recorded as the newest entry.
    pub fn should_dedupe(
        &self,
        account_id: &str,
        chat_id: &str,
        fingerprint: &str,
        now_ms: Option<u64>,
        window_ms: Option<u64>,
    ) -> bool {
        let now = now_ms.unwrap_or_else(wall_clock_ms);
        let window = window_ms.unwrap_or(self.default_window_ms);
        let chat_key = format!("{account_id}:{chat_id}");

        let mut chats = self.chats.lock();

        // Touch the chat (LRU) and bound the chat map.
        if !chats.touch(&chat_key) {
            chats.insert_tail(chat_key.clone(), OrderedMap::new());
        }
        chats.evict_head_while(MAX_CHATS);

        let chat = chats.get_mut(&chat_key).expect("just inserted");

        // Lazy prune: entries are ordered by last touch, so expiry stops at
        // the first still-fresh entry.
        chat.prune_head_while(|e| now.saturating_sub(e.ts) > window);

        if let Some(entry) = chat.get_mut(fingerprint) {
            if now.saturating_sub(entry.ts) <= window {
                chat.touch(fingerprint);
                return true;
            }
        }

        chat.insert_tail(fingerprint.to_owned(), FingerprintEntry { ts: now });
        chat.evict_head_while(MAX_FINGERPRINTS_PER_CHAT);
        false
    }

    pub fn chat_count(&self) -> usize {
        self.chats.lock().len()
    }
}

impl Default for VoiceDeduper {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_MS)
    }
}

fn wall_clock_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
