//! Synthesized audio cache
//!
//! Bounded cache keyed on (text, voice, speed). The key carries a hash of
//! the normalized text rather than the text itself, but each entry stores
//! the full text and a hit requires it to match, so a hash collision can
//! never play the wrong audio. Eviction is insertion-ordered and entries
//! expire after a day.

use crate::message::{CacheEntryInfo, CacheStats};
use log::{debug, info};
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Entries older than this are stale
pub const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Text preview length in stats reports
const PREVIEW_CHARS: usize = 50;

/// Cache key: text hash plus the synthesis parameters that shape the audio
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    text_hash: u64,
    voice: String,
    /// Speed in thousandths, so 1.25x keys as 1250
    speed_milli: u32,
}

impl CacheKey {
    fn new(text: &str, voice: &str, speed: f32) -> Self {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        Self {
            text_hash: hasher.finish(),
            voice: voice.to_string(),
            speed_milli: (speed * 1000.0).round() as u32,
        }
    }

    fn display(&self) -> String {
        format!(
            "{:016x}:{}:{}",
            self.text_hash, self.voice, self.speed_milli
        )
    }
}

struct CacheEntry {
    audio: Vec<u8>,
    /// Full normalized text, checked on every hit
    text: String,
    created: SystemTime,
}

/// Bounded audio cache with insertion-order eviction
pub struct AudioCache {
    entries: HashMap<CacheKey, CacheEntry>,
    /// Keys in insertion order; front is evicted first
    order: VecDeque<CacheKey>,
    max_size: usize,
}

impl AudioCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            max_size,
        }
    }

    /// Collapse runs of whitespace and trim, so texts that differ only in
    /// spacing share one entry
    fn normalize(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Look up audio for a request. Expired entries are removed on sight.
    pub fn get(&mut self, text: &str, voice: &str, speed: f32) -> Option<Vec<u8>> {
        self.get_at(text, voice, speed, SystemTime::now())
    }

    fn get_at(&mut self, text: &str, voice: &str, speed: f32, now: SystemTime) -> Option<Vec<u8>> {
        let text = Self::normalize(text);
        let key = CacheKey::new(&text, voice, speed);
        let entry = self.entries.get(&key)?;

        if is_expired(entry.created, now) {
            debug!("Cache entry expired: {}", key.display());
            self.remove(&key);
            return None;
        }
        // Same hash, different text: a collision, not a hit
        if entry.text != text {
            debug!("Cache hash collision on {}", key.display());
            return None;
        }

        debug!("Cache hit: {}", key.display());
        Some(entry.audio.clone())
    }

    /// Store audio for a request, evicting the oldest entries past capacity
    pub fn put(&mut self, text: &str, voice: &str, speed: f32, audio: Vec<u8>) {
        self.put_at(text, voice, speed, audio, SystemTime::now())
    }

    fn put_at(&mut self, text: &str, voice: &str, speed: f32, audio: Vec<u8>, now: SystemTime) {
        let text = Self::normalize(text);
        let key = CacheKey::new(&text, voice, speed);

        // Re-inserting counts as a fresh insertion for eviction order
        if self.entries.contains_key(&key) {
            self.order.retain(|k| k != &key);
        }
        self.order.push_back(key.clone());
        self.entries.insert(
            key,
            CacheEntry {
                audio,
                text,
                created: now,
            },
        );

        while self.entries.len() > self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                debug!("Evicting oldest cache entry: {}", oldest.display());
                self.entries.remove(&oldest);
            } else {
                break;
            }
        }
    }

    fn remove(&mut self, key: &CacheKey) {
        self.entries.remove(key);
        self.order.retain(|k| k != key);
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn clean_expired(&mut self) -> usize {
        self.clean_expired_at(SystemTime::now())
    }

    fn clean_expired_at(&mut self, now: SystemTime) -> usize {
        let stale: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| is_expired(entry.created, now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            self.remove(key);
        }
        if !stale.is_empty() {
            info!("Removed {} expired cache entries", stale.len());
        }
        stale.len()
    }

    /// Drop everything
    pub fn clear(&mut self) {
        let count = self.entries.len();
        self.entries.clear();
        self.order.clear();
        info!("Cleared {} cache entries", count);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot for the cache stats reply, in insertion order
    pub fn stats(&self) -> CacheStats {
        let entries = self
            .order
            .iter()
            .filter_map(|key| {
                let entry = self.entries.get(key)?;
                let mut preview: String = entry.text.chars().take(PREVIEW_CHARS).collect();
                if entry.text.chars().count() > PREVIEW_CHARS {
                    preview.push_str("...");
                }
                Some(CacheEntryInfo {
                    key: key.display(),
                    text: preview,
                    timestamp: entry
                        .created
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_secs())
                        .unwrap_or(0),
                })
            })
            .collect();

        CacheStats {
            size: self.entries.len(),
            max_size: self.max_size,
            entries,
        }
    }
}

fn is_expired(created: SystemTime, now: SystemTime) -> bool {
    now.duration_since(created)
        .map(|age| age > CACHE_TTL)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(byte: u8) -> Vec<u8> {
        vec![byte; 16]
    }

    #[test]
    fn hit_requires_matching_parameters() {
        let mut cache = AudioCache::new(10);
        cache.put("hello world", "nova", 1.0, audio(1));

        assert_eq!(cache.get("hello world", "nova", 1.0), Some(audio(1)));
        assert!(cache.get("hello world", "alloy", 1.0).is_none());
        assert!(cache.get("hello world", "nova", 1.5).is_none());
        assert!(cache.get("different text", "nova", 1.0).is_none());
    }

    #[test]
    fn text_is_normalized_before_keying() {
        let mut cache = AudioCache::new(10);
        cache.put("  padded text  ", "nova", 1.0, audio(2));
        assert_eq!(cache.get("padded text", "nova", 1.0), Some(audio(2)));
    }

    #[test]
    fn interior_whitespace_does_not_split_entries() {
        let mut cache = AudioCache::new(10);
        cache.put("one\n\ntwo   three", "nova", 1.0, audio(3));
        assert_eq!(cache.get("one two three", "nova", 1.0), Some(audio(3)));
        assert_eq!(cache.get("one\ttwo three", "nova", 1.0), Some(audio(3)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evicts_in_insertion_order() {
        let mut cache = AudioCache::new(2);
        cache.put("first entry text", "nova", 1.0, audio(1));
        cache.put("second entry text", "nova", 1.0, audio(2));
        cache.put("third entry text", "nova", 1.0, audio(3));

        assert!(cache.get("first entry text", "nova", 1.0).is_none());
        assert!(cache.get("second entry text", "nova", 1.0).is_some());
        assert!(cache.get("third entry text", "nova", 1.0).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn reinsert_refreshes_eviction_order() {
        let mut cache = AudioCache::new(2);
        cache.put("alpha text here", "nova", 1.0, audio(1));
        cache.put("beta text here", "nova", 1.0, audio(2));
        // Re-insert alpha; beta is now the oldest
        cache.put("alpha text here", "nova", 1.0, audio(3));
        cache.put("gamma text here", "nova", 1.0, audio(4));

        assert!(cache.get("beta text here", "nova", 1.0).is_none());
        assert_eq!(cache.get("alpha text here", "nova", 1.0), Some(audio(3)));
    }

    #[test]
    fn expired_entries_miss_and_clean() {
        let mut cache = AudioCache::new(10);
        let start = SystemTime::now();
        cache.put_at("old entry text", "nova", 1.0, audio(1), start);
        cache.put_at("new entry text", "nova", 1.0, audio(2), start + CACHE_TTL);

        let later = start + CACHE_TTL + Duration::from_secs(1);
        assert!(cache.get_at("old entry text", "nova", 1.0, later).is_none());
        assert!(cache.get_at("new entry text", "nova", 1.0, later).is_some());

        cache.put_at("old entry text", "nova", 1.0, audio(1), start);
        assert_eq!(cache.clean_expired_at(later), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn stats_report_previews_and_order() {
        let mut cache = AudioCache::new(10);
        cache.put(&"long ".repeat(30), "nova", 1.0, audio(1));
        cache.put("short text here", "nova", 1.25, audio(2));

        let stats = cache.stats();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.max_size, 10);
        assert!(stats.entries[0].text.ends_with("..."));
        assert_eq!(stats.entries[1].text, "short text here");
        assert!(stats.entries[1].key.ends_with(":nova:1250"));
        assert!(stats.entries[0].timestamp > 0);
    }

    #[test]
    fn clear_empties_everything() {
        let mut cache = AudioCache::new(10);
        cache.put("some entry text", "nova", 1.0, audio(1));
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get("some entry text", "nova", 1.0).is_none());
    }
}
