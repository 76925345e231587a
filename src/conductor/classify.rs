//! Understanding: a cached, deterministic classification of a raw goal into
//! a coarse category, the ambiguity-score heuristic, and the single
//! `is_simple_one_shot` predicate that decides fan-out vs. light delegation.
//!
//! `understand_goal` stays local and deterministic rather than an LLM call
//! so the greeting / what-can-you-do / status-query fast paths never touch
//! the Router, and so `is_simple_one_shot` stays a pure function of the
//! string, not a function of whatever the model felt like answering.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Coarse intent bucket produced by `understand_goal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Simple,
    Investigate,
    MultiStep,
    StatusQuery,
    Greeting,
    WhatCanYouDo,
    Coding,
    Execution,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Understanding {
    pub restated: String,
    pub category: Category,
}

const GREETING_WORDS: &[&str] = &["привет", "hello", "hi", "hey", "здравствуй", "good morning", "good evening"];
const CAPABILITY_PHRASES: &[&str] = &["what can you do", "что ты умеешь", "your capabilities", "what do you do"];
const STATUS_WORDS: &[&str] = &["status", "статус", "как дела", "what's the status", "progress on"];
const CODING_WORDS: &[&str] = &[
    "function", "функци", "code", "код", "напиши", "implement", "bug", "баг", "class ", "класс", "алгоритм", "script",
    "refactor", "parse", "regex",
];
const EXECUTION_WORDS: &[&str] = &["run ", "execute", "deploy", "запусти", "выполни", "install"];
const PRONOUNS: &[&str] = &["он ", "она ", "оно ", "они ", " it ", " this ", " that ", "него", "нее"];
const INDEFINITE_WORDS: &[&str] = &["something", "что-то", "somehow", "как-то", "stuff", "some thing"];

fn contains_any(haystack_lower: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack_lower.contains(n))
}

/// Deterministic, local classification. Never calls the Router.
pub fn understand_goal(goal: &str) -> Understanding {
    let trimmed = goal.trim();
    let lower = format!(" {} ", trimmed.to_lowercase());
    let word_count = trimmed.split_whitespace().count();

    let category = if contains_any(&lower, GREETING_WORDS) && word_count <= 4 {
        Category::Greeting
    } else if contains_any(&lower, CAPABILITY_PHRASES) {
        Category::WhatCanYouDo
    } else if contains_any(&lower, STATUS_WORDS) {
        Category::StatusQuery
    } else if contains_any(&lower, CODING_WORDS) {
        Category::Coding
    } else if contains_any(&lower, EXECUTION_WORDS) {
        Category::Execution
    } else if word_count > 25 || conjunction_count(trimmed) >= 2 {
        Category::MultiStep
    } else if word_count <= 2 {
        Category::Simple
    } else {
        Category::Investigate
    };

    Understanding {
        restated: trimmed.to_string(),
        category,
    }
}

fn conjunction_count(goal: &str) -> usize {
    let lower = goal.to_lowercase();
    lower.matches(" and ").count() + lower.matches(" then ").count() + lower.matches(", ").count()
}

/// Score against the deterministic ambiguity heuristic: word count under 3,
/// a bare pronoun with no antecedent in the same sentence, an indefinite
/// word, two or more conjunctions, or a multi-step goal stated too tersely
/// to decompose. A score of 2 or more means the Conductor should ask for
/// clarification instead of routing further.
pub fn ambiguity_score(goal: &str, category: Category) -> u32 {
    let trimmed = goal.trim();
    let lower = format!(" {} ", trimmed.to_lowercase());
    let word_count = trimmed.split_whitespace().count();

    let mut score = 0;
    if word_count < 3 {
        score += 1;
    }
    if contains_any(&lower, PRONOUNS) {
        score += 1;
    }
    if contains_any(&lower, INDEFINITE_WORDS) {
        score += 1;
    }
    if conjunction_count(trimmed) >= 2 {
        score += 1;
    }
    if category == Category::MultiStep && word_count < 6 {
        score += 1;
    }
    score
}

pub fn is_ambiguous(goal: &str, category: Category) -> bool {
    ambiguity_score(goal, category) >= 2
}

/// Pure function of the goal string: short, single clause, and names a
/// concrete file, path or command rather than an open-ended objective.
pub fn is_simple_one_shot(goal: &str) -> bool {
    let trimmed = goal.trim();
    let word_count = trimmed.split_whitespace().count();
    if word_count == 0 || word_count > 12 {
        return false;
    }
    if conjunction_count(trimmed) > 0 {
        return false;
    }
    trimmed.split_whitespace().any(|w| {
        (w.contains('.') && w.len() > 2 && !w.ends_with('.')) || w.starts_with('/') || w.starts_with("./") || w.contains('`')
    })
}

struct Entry {
    value: Understanding,
    inserted_at: Instant,
}

struct Inner {
    entries: HashMap<String, Entry>,
    order: VecDeque<String>,
}

fn cache_key(project_context: &str, goal: &str, session_summary: Option<&str>) -> String {
    let mut hasher = Md5::new();
    hasher.update(project_context.as_bytes());
    hasher.update(b"\0");
    hasher.update(goal.trim().to_lowercase().as_bytes());
    hasher.update(b"\0");
    hasher.update(session_summary.unwrap_or("").as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Cache for `understand_goal`, keyed on `(project_context, goal,
/// session_summary)` so results never leak across projects — the same
/// LRU-with-TTL shape as `router::EmbedCache` and `retrieval::ContextCache`.
pub struct UnderstandCache {
    inner: Mutex<Inner>,
    capacity: usize,
    ttl: Duration,
}

impl UnderstandCache {
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

    pub async fn get_or_compute(&self, project_context: &str, goal: &str, session_summary: Option<&str>) -> Understanding {
        let key = cache_key(project_context, goal, session_summary);
        let mut inner = self.inner.lock().await;
        self.evict_expired(&mut inner);

        if let Some(entry) = inner.entries.get(&key) {
            return entry.value.clone();
        }

        let value = understand_goal(goal);
        inner.order.push_back(key.clone());
        inner.entries.insert(
            key,
            Entry {
                value: value.clone(),
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
        value
    }

    fn evict_expired(&self, inner: &mut Inner) {
        let ttl = self.ttl;
        let expired: Vec<String> = inner
            .order
            .iter()
            .filter(|k| inner.entries.get(*k).map(|e| e.inserted_at.elapsed() > ttl).unwrap_or(false))
            .take(50)
            .cloned()
            .collect();
        for key in expired {
            inner.entries.remove(&key);
            inner.order.retain(|k| k != &key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_is_classified_without_any_other_signal() {
        let u = understand_goal("hi there");
        assert_eq!(u.category, Category::Greeting);
    }

    #[test]
    fn coding_keyword_wins_classification() {
        let u = understand_goal("напиши функцию для парсинга даты");
        assert_eq!(u.category, Category::Coding);
    }

    #[test]
    fn short_pronoun_goal_is_ambiguous() {
        assert!(is_ambiguous("fix it", Category::Investigate));
    }

    #[test]
    fn well_formed_goal_is_not_ambiguous() {
        let u = understand_goal("write a function that parses ISO-8601 dates");
        assert!(!is_ambiguous("write a function that parses ISO-8601 dates", u.category));
    }

    #[test]
    fn one_shot_requires_a_concrete_file_or_command() {
        assert!(is_simple_one_shot("fix the typo in README.md"));
        assert!(!is_simple_one_shot("improve the codebase"));
    }

    #[test]
    fn one_shot_rejects_conjunctions() {
        assert!(!is_simple_one_shot("fix config.yml and restart the service"));
    }

    #[tokio::test]
    async fn cache_key_distinguishes_project_context() {
        let cache = UnderstandCache::new(10, Duration::from_secs(60));
        let a = cache.get_or_compute("proj-a", "hello", None).await;
        let b = cache.get_or_compute("proj-b", "hello", None).await;
        assert_eq!(a.category, b.category);
    }

    #[tokio::test]
    async fn repeated_call_is_served_from_cache() {
        let cache = UnderstandCache::new(10, Duration::from_secs(60));
        let first = cache.get_or_compute("proj", "what can you do", None).await;
        let second = cache.get_or_compute("proj", "what can you do", None).await;
        assert_eq!(first.category, second.category);
    }

    #[tokio::test]
    async fn capacity_evicts_oldest_entry() {
        let cache = UnderstandCache::new(1, Duration::from_secs(60));
        cache.get_or_compute("proj", "goal one", None).await;
        cache.get_or_compute("proj", "goal two", None).await;
        let inner = cache.inner.lock().await;
        assert_eq!(inner.entries.len(), 1);
    }
}
