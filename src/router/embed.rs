//! In-memory LRU-with-TTL embedding cache, keyed by a normalized-text MD5.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use md5::{Digest, Md5};
use tokio::sync::Mutex;

struct Entry {
    vector: Vec<f32>,
    inserted_at: Instant,
}

struct Inner {
    entries: HashMap<String, Entry>,
    /// Insertion/access order, most-recently-used at the back.
    order: VecDeque<String>,
}

/// Small in-memory LRU with TTL backing `Router::embed`. Normalizes text the
/// same way before hashing so "Foo  Bar" and "foo bar" share a cache slot.
pub struct EmbedCache {
    inner: Mutex<Inner>,
    capacity: usize,
    ttl: Duration,
}

/// normalize = lowercase then collapse internal whitespace, matching the
/// Router's cache-key convention.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

pub fn cache_key(text: &str) -> String {
    let normalized = normalize(text);
    let mut hasher = Md5::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl EmbedCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity,
            ttl,
        }
    }

    pub async fn get(&self, text: &str) -> Option<Vec<f32>> {
        let key = cache_key(text);
        let mut inner = self.inner.lock().await;
        let expired = inner
            .entries
            .get(&key)
            .map(|e| e.inserted_at.elapsed() > self.ttl)
            .unwrap_or(false);
        if expired {
            inner.entries.remove(&key);
            inner.order.retain(|k| k != &key);
            return None;
        }
        if let Some(entry) = inner.entries.get(&key) {
            let vector = entry.vector.clone();
            inner.order.retain(|k| k != &key);
            inner.order.push_back(key);
            return Some(vector);
        }
        None
    }

    pub async fn put(&self, text: &str, vector: Vec<f32>) {
        let key = cache_key(text);
        let mut inner = self.inner.lock().await;
        if !inner.entries.contains_key(&key) {
            inner.order.push_back(key.clone());
        }
        inner.entries.insert(
            key,
            Entry {
                vector,
                inserted_at: Instant::now(),
            },
        );
        while inner.entries.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace_and_case() {
        assert_eq!(normalize("Foo   Bar\tBaz"), "foo bar baz");
    }

    #[test]
    fn cache_key_is_stable_for_equivalent_text() {
        assert_eq!(cache_key("Foo Bar"), cache_key("foo  bar"));
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let cache = EmbedCache::new(10, Duration::from_secs(60));
        cache.put("hello world", vec![1.0, 2.0]).await;
        assert_eq!(cache.get("Hello   World").await, Some(vec![1.0, 2.0]));
    }

    #[tokio::test]
    async fn evicts_oldest_past_capacity() {
        let cache = EmbedCache::new(2, Duration::from_secs(60));
        cache.put("a", vec![1.0]).await;
        cache.put("b", vec![2.0]).await;
        cache.put("c", vec![3.0]).await;
        assert!(cache.get("a").await.is_none());
        assert!(cache.get("b").await.is_some());
        assert!(cache.get("c").await.is_some());
    }

    #[tokio::test]
    async fn expires_past_ttl() {
        let cache = EmbedCache::new(10, Duration::from_millis(1));
        cache.put("a", vec![1.0]).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get("a").await.is_none());
    }
}
