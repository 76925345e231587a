//! Retrieval: turns a goal into a short relevance-ordered context block of
//! knowledge snippets, backed by an in-process cache and cosine-similarity
//! search over `KnowledgeNode` rows.
//!
//! Mirrors the Router's shape: a struct owning its own cache and config,
//! talking to the `StateManager` actor rather than a raw `Store`.

mod cache;
mod config;
mod error;
mod latency;

pub use cache::ContextCache;
pub use config::RetrievalConfig;
pub use error::RetrievalError;
pub use latency::{LatencySnapshot, LatencyTracker, Stage};

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use taskstore::{now_ms, Filter, IndexValue};
use tracing::debug;

use crate::domain::KnowledgeNode;
use crate::router::Router;
use crate::state::StateManager;

/// One retrieved knowledge snippet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snippet {
    pub node_id: String,
    pub text: String,
    pub similarity: f32,
}

/// The result of `Retrieval::context`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextBlock {
    pub snippets: Vec<Snippet>,
}

impl ContextBlock {
    /// Join snippets into a single block of text for prompt assembly,
    /// capped by `max_chars`.
    pub fn render(&self, max_chars: usize) -> String {
        let mut out = String::new();
        for snippet in &self.snippets {
            if out.len() + snippet.text.len() > max_chars {
                break;
            }
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(&snippet.text);
        }
        out
    }
}

/// Extract the 1-3 longest whitespace-delimited keywords from `goal`, for
/// the substring-match fallback search.
fn keywords(goal: &str) -> Vec<String> {
    let mut words: Vec<&str> = goal
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| w.len() >= 3)
        .collect();
    words.sort_by_key(|w| std::cmp::Reverse(w.len()));
    words.dedup();
    words.into_iter().take(3).map(|w| w.to_lowercase()).collect()
}

fn length_bonus(content_len: usize) -> f32 {
    (content_len as f32 / 1000.0).clamp(0.5, 1.5)
}

pub struct Retrieval {
    config: RetrievalConfig,
    cache: ContextCache,
    latency: LatencyTracker,
}

impl Retrieval {
    pub fn new(config: RetrievalConfig) -> Self {
        let cache = ContextCache::new(config.cache_max_entries, Duration::from_secs(config.cache_ttl_sec));
        let latency = LatencyTracker::new(config.slow_embed_ms, config.slow_prepare_ms, config.slow_llm_plan_ms);
        Self {
            config,
            cache,
            latency,
        }
    }

    pub fn latency(&self) -> &LatencyTracker {
        &self.latency
    }

    /// Produce a context block for `goal`, scoped to `project_context` so
    /// cached results never leak across projects.
    pub async fn context(
        &self,
        state: &StateManager,
        router: &Router,
        project_context: &str,
        goal: &str,
        precomputed_embedding: Option<Vec<f32>>,
    ) -> Result<ContextBlock, RetrievalError> {
        debug!(project_context, goal_len = goal.len(), "Retrieval::context: called");
        if goal.trim().is_empty() {
            return Err(RetrievalError::EmptyGoal);
        }

        if precomputed_embedding.is_none() {
            if let Some(cached) = self.cache.get(project_context, goal).await {
                debug!("Retrieval::context: cache hit");
                return Ok(cached);
            }
        }

        let embed_start = Instant::now();
        let query = match precomputed_embedding {
            Some(v) => v,
            None => router.embed(goal).await?,
        };
        self.latency.record(Stage::Embed, embed_start.elapsed(), now_ms()).await;

        let prepare_start = Instant::now();
        let block = self.search(state, goal, &query).await?;
        self.latency.record(Stage::Prepare, prepare_start.elapsed(), now_ms()).await;

        self.cache.put(project_context, goal, block.clone()).await;
        debug!(snippets = block.snippets.len(), "Retrieval::context: returning");
        Ok(block)
    }

    async fn search(&self, state: &StateManager, goal: &str, query: &[f32]) -> Result<ContextBlock, RetrievalError> {
        let fetch_limit = if self.config.rerank {
            self.config.top_k * 2
        } else {
            self.config.top_k
        };

        let embedded_nodes = state
            .list_knowledge_nodes(vec![Filter::eq("has_embedding", IndexValue::Bool(true))])
            .await
            .map_err(|e| RetrievalError::Store(e.to_string()))?;

        let mut primary: Vec<(f32, KnowledgeNode)> = embedded_nodes
            .into_iter()
            .filter_map(|node| node.cosine_similarity(query).map(|sim| (sim, node)))
            .filter(|(sim, _)| *sim >= self.config.sim_threshold)
            .collect();
        primary.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.1.confidence_score.partial_cmp(&a.1.confidence_score).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| b.1.usage_count.cmp(&a.1.usage_count))
        });
        primary.truncate(fetch_limit);

        let mut candidates = primary;

        let remaining = self.config.top_k.saturating_sub(candidates.len());
        if remaining > 0 {
            let terms = keywords(goal);
            if !terms.is_empty() {
                let unembedded = state
                    .list_knowledge_nodes(vec![Filter::eq("has_embedding", IndexValue::Bool(false))])
                    .await
                    .map_err(|e| RetrievalError::Store(e.to_string()))?;

                let mut secondary: Vec<KnowledgeNode> = unembedded
                    .into_iter()
                    .filter(|node| {
                        let content_lower = node.content.to_lowercase();
                        terms.iter().any(|term| content_lower.contains(term.as_str()))
                    })
                    .collect();
                secondary.sort_by(|a, b| {
                    b.confidence_score
                        .partial_cmp(&a.confidence_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| b.created_at.cmp(&a.created_at))
                });
                secondary.truncate(remaining);
                candidates.extend(secondary.into_iter().map(|node| (0.0, node)));
            }
        }

        if self.config.rerank {
            candidates.sort_by(|a, b| {
                let score_a = a.0 * length_bonus(a.1.content.len());
                let score_b = b.0 * length_bonus(b.1.content.len());
                score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        candidates.truncate(self.config.top_k);

        let unique_top1 = candidates.len() >= 2 && candidates[0].0 > candidates[1].0
            || candidates.len() == 1;

        let snippets = candidates
            .into_iter()
            .enumerate()
            .map(|(i, (similarity, node))| {
                let limit = if i == 0 && unique_top1 {
                    self.config.top1_full_max_chars
                } else {
                    self.config.snippet_chars
                };
                let text = truncate_chars(&node.content, limit);
                Snippet {
                    node_id: node.id,
                    text,
                    similarity,
                }
            })
            .collect();

        Ok(ContextBlock { snippets })
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EMBEDDING_DIM;
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::{CompletionResponse, StopReason, TokenUsage};
    use crate::router::RouterConfig;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn harness() -> (StateManager, Router, TempDir) {
        let dir = TempDir::new().unwrap();
        let state = StateManager::spawn(dir.path()).unwrap();
        let fast = Arc::new(MockLlmClient::new(vec![CompletionResponse {
            content: Some("ok".to_string()),
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::default(),
        }]));
        let heavy = fast.clone();
        let router = Router::new(RouterConfig::default(), fast, heavy, HashMap::new());
        (state, router, dir)
    }

    fn embedding_of(seed: f32) -> Vec<f32> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        v[0] = seed;
        v
    }

    #[tokio::test]
    async fn rejects_empty_goal() {
        let (state, router, _dir) = harness().await;
        let retrieval = Retrieval::new(RetrievalConfig::default());
        let err = retrieval.context(&state, &router, "proj", "   ", None).await.unwrap_err();
        assert!(matches!(err, RetrievalError::EmptyGoal));
    }

    #[tokio::test]
    async fn primary_search_orders_by_similarity() {
        let (state, router, _dir) = harness().await;
        let mut high = KnowledgeNode::new("the high similarity fact", "self")
            .with_embedding(embedding_of(1.0))
            .unwrap();
        high.confidence_score = 0.9;
        let mut low = KnowledgeNode::new("the low similarity fact", "self")
            .with_embedding(embedding_of(0.7))
            .unwrap();
        low.confidence_score = 0.9;
        state.create_knowledge_node(high).await.unwrap();
        state.create_knowledge_node(low).await.unwrap();

        let retrieval = Retrieval::new(RetrievalConfig::default());
        let block = retrieval
            .context(&state, &router, "proj", "goal", Some(embedding_of(1.0)))
            .await
            .unwrap();
        assert!(!block.snippets.is_empty());
        assert_eq!(block.snippets[0].text, "the high similarity fact");
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let (state, router, _dir) = harness().await;
        let node = KnowledgeNode::new("cached fact", "self").with_embedding(embedding_of(1.0)).unwrap();
        state.create_knowledge_node(node).await.unwrap();

        let retrieval = Retrieval::new(RetrievalConfig::default());
        let first = retrieval
            .context(&state, &router, "proj", "goal", Some(embedding_of(1.0)))
            .await
            .unwrap();
        let second = retrieval.context(&state, &router, "proj", "goal", None).await.unwrap();
        assert_eq!(first.snippets.len(), second.snippets.len());
    }

    #[tokio::test]
    async fn secondary_fallback_matches_keyword_without_embedding() {
        let (state, router, _dir) = harness().await;
        let node = KnowledgeNode::new("how to configure the retrieval subsystem", "self");
        state.create_knowledge_node(node).await.unwrap();

        let retrieval = Retrieval::new(RetrievalConfig::default());
        let block = retrieval
            .context(&state, &router, "proj", "please configure retrieval", Some(embedding_of(0.0)))
            .await
            .unwrap();
        assert!(block.snippets.iter().any(|s| s.text.contains("retrieval subsystem")));
    }

    #[test]
    fn keywords_picks_longest_words() {
        let ks = keywords("fix the database connection bug");
        assert_eq!(ks, vec!["connection", "database", "fix"]);
    }

    #[test]
    fn length_bonus_is_clamped() {
        assert_eq!(length_bonus(100), 0.5);
        assert_eq!(length_bonus(5000), 1.5);
    }
}
