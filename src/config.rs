//! orchestratord configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::conductor::ConductorConfig;
use crate::executor::ExecutorConfig;
use crate::retrieval::RetrievalConfig;
use crate::router::RouterConfig;

/// Top-level orchestratord configuration, layered: explicit `--config` path,
/// then `./.orchestratord.yml`, then `$XDG_CONFIG_HOME/orchestratord/config.yml`,
/// then these compiled-in defaults. Every field is `#[serde(default)]` so a
/// partial file is legal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM backend configuration, one per Router family.
    pub llm: LlmConfig,

    /// Conductor tuning (sync slots, understanding cache, fan-out bounds).
    pub conductor: ConductorConfig,

    /// Executor tuning (worker pool, heartbeat, retries, assignment).
    pub executor: ExecutorConfig,

    /// Router tuning (concurrency ceilings, catalog, embedding cache).
    pub router: RouterConfig,

    /// Retrieval tuning (cache, top-k, reranking, latency thresholds).
    pub retrieval: RetrievalConfig,

    /// Storage configuration.
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration with fallback chain.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .orchestratord.yml
        let local_config = PathBuf::from(".orchestratord.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: $XDG_CONFIG_HOME/orchestratord/config.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("orchestratord").join("config.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM backend configuration: one concrete backend per Router family.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// The low-latency family (Router's "fast" slot).
    pub fast: BackendConfig,

    /// The high-capability family (Router's "heavy" slot), also used for
    /// planning, synthesis and board-escalation prompts.
    pub heavy: BackendConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            fast: BackendConfig::fast_default(),
            heavy: BackendConfig::heavy_default(),
        }
    }
}

/// A single LLM backend: provider, model, credentials and timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Provider name ("anthropic" or "openai").
    pub provider: String,

    /// Model identifier.
    pub model: String,

    /// Environment variable containing the API key.
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL.
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response.
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds.
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::fast_default()
    }
}

impl BackendConfig {
    fn fast_default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com".to_string(),
            max_tokens: 4096,
            timeout_ms: 60_000,
        }
    }

    fn heavy_default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 16384,
            timeout_ms: 300_000,
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for TaskStore data.
    #[serde(rename = "taskstore-dir")]
    pub taskstore_dir: String,

    /// Warning threshold for JSONL audit-log file size in MB.
    #[serde(rename = "jsonl-warn-mb")]
    pub jsonl_warn_mb: u32,

    /// Error threshold for JSONL audit-log file size in MB.
    #[serde(rename = "jsonl-error-mb")]
    pub jsonl_error_mb: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            taskstore_dir: ".taskstore".to_string(),
            jsonl_warn_mb: 100,
            jsonl_error_mb: 500,
        }
    }
}
