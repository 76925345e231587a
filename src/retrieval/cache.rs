//! In-memory LRU-with-TTL cache mapping a goal to its last `ContextBlock`.
//!
//! Keyed on `md5(project_context || '\0' || lower(trim(goal)))` so two
//! projects asking the same question never share a cache slot (the cache
//! safety property from the test suite).

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use md5::{Digest, Md5};
use tokio::sync::Mutex;

use super::ContextBlock;

struct Entry {
    block: ContextBlock,
    inserted_at: Instant,
}

struct Inner {
    entries: HashMap<String, Entry>,
    order: VecDeque<String>,
}

pub struct ContextCache {
    inner: Mutex<Inner>,
    capacity: usize,
    ttl: Duration,
}

pub fn cache_key(project_context: &str, goal: &str) -> String {
    let normalized_goal = goal.trim().to_lowercase();
    let mut hasher = Md5::new();
    hasher.update(project_context.as_bytes());
    hasher.update(b"\0");
    hasher.update(normalized_goal.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl ContextCache {
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

    /// Evict up to 50 expired entries, then look up `key`.
    pub async fn get(&self, project_context: &str, goal: &str) -> Option<ContextBlock> {
        let key = cache_key(project_context, goal);
        let mut inner = self.inner.lock().await;
        self.evict_expired(&mut inner, 50);

        if let Some(entry) = inner.entries.get(&key) {
            let block = entry.block.clone();
            inner.order.retain(|k| k != &key);
            inner.order.push_back(key);
            return Some(block);
        }
        None
    }

    pub async fn put(&self, project_context: &str, goal: &str, block: ContextBlock) {
        let key = cache_key(project_context, goal);
        let mut inner = self.inner.lock().await;
        if !inner.entries.contains_key(&key) {
            inner.order.push_back(key.clone());
        }
        inner.entries.insert(
            key,
            Entry {
                block,
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

    fn evict_expired(&self, inner: &mut Inner, max: usize) {
        let ttl = self.ttl;
        let mut evicted = 0;
        let expired_keys: Vec<String> = inner
            .order
            .iter()
            .filter(|k| {
                inner
                    .entries
                    .get(*k)
                    .map(|e| e.inserted_at.elapsed() > ttl)
                    .unwrap_or(false)
            })
            .take(max)
            .cloned()
            .collect();
        for key in expired_keys {
            inner.entries.remove(&key);
            inner.order.retain(|k| k != &key);
            evicted += 1;
            if evicted >= max {
                break;
            }
        }
    }
}
