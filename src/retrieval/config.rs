//! Retrieval configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Cache entry TTL.
    #[serde(rename = "cache-ttl-sec")]
    pub cache_ttl_sec: u64,

    /// Cache entry cap (LRU eviction beyond this).
    #[serde(rename = "cache-max-entries")]
    pub cache_max_entries: usize,

    /// Max characters emitted per snippet.
    #[serde(rename = "snippet-chars")]
    pub snippet_chars: usize,

    /// Max characters the top-1 snippet may expand to when its similarity
    /// is the unique maximum.
    #[serde(rename = "top1-full-max-chars")]
    pub top1_full_max_chars: usize,

    /// Candidates returned from a search.
    #[serde(rename = "top-k")]
    pub top_k: usize,

    /// Minimum cosine similarity for a primary-search hit.
    #[serde(rename = "sim-threshold")]
    pub sim_threshold: f32,

    /// Enable the length-bonus reranking pass.
    #[serde(rename = "rerank")]
    pub rerank: bool,

    /// embed_ms / prepare_ms / llm_plan_ms ceilings before a stage counts
    /// towards `slow_count`.
    #[serde(rename = "slow-embed-ms")]
    pub slow_embed_ms: u64,
    #[serde(rename = "slow-prepare-ms")]
    pub slow_prepare_ms: u64,
    #[serde(rename = "slow-llm-plan-ms")]
    pub slow_llm_plan_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            cache_ttl_sec: 120,
            cache_max_entries: 500,
            snippet_chars: 500,
            top1_full_max_chars: 2000,
            top_k: 5,
            sim_threshold: 0.6,
            rerank: false,
            slow_embed_ms: 200,
            slow_prepare_ms: 100,
            slow_llm_plan_ms: 3000,
        }
    }
}
