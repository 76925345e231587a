//! Router configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Per-family concurrency ceiling.
    #[serde(rename = "max-concurrent-family")]
    pub max_concurrent_family: usize,

    /// Heavy-family ceiling, independent of `max_concurrent_family`.
    #[serde(rename = "max-heavy-mlx")]
    pub max_heavy_mlx: usize,

    /// Fast-family heavy-model ceiling (e.g. a large Ollama-like model).
    #[serde(rename = "max-heavy-ollama")]
    pub max_heavy_ollama: usize,

    /// How long a refreshed model catalog entry stays valid.
    #[serde(rename = "catalog-ttl-sec")]
    pub catalog_ttl_sec: u64,

    /// Per-request LLM HTTP timeout.
    #[serde(rename = "llm-timeout-sec")]
    pub llm_timeout_sec: u64,

    /// Minimum interval between heartbeat chunks on a stream.
    #[serde(rename = "heartbeat-stream-sec")]
    pub heartbeat_stream_sec: u64,

    /// Cooldown applied to a family+category pair after a 429.
    #[serde(rename = "rate-limit-cooldown-sec")]
    pub rate_limit_cooldown_sec: u64,

    /// Force the heavy family off (reliability fallback).
    #[serde(rename = "heavy-disabled")]
    pub heavy_disabled: bool,

    /// Embedding cache capacity and TTL.
    #[serde(rename = "embed-cache-size")]
    pub embed_cache_size: usize,
    #[serde(rename = "embed-cache-ttl-sec")]
    pub embed_cache_ttl_sec: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_concurrent_family: 10,
            max_heavy_mlx: 2,
            max_heavy_ollama: 2,
            catalog_ttl_sec: 120,
            llm_timeout_sec: 300,
            heartbeat_stream_sec: 10,
            rate_limit_cooldown_sec: 60,
            heavy_disabled: false,
            embed_cache_size: 1000,
            embed_cache_ttl_sec: 600,
        }
    }
}

impl RouterConfig {
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_sec)
    }
}
