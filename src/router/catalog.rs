//! Model catalog: a process-resident, periodically refreshed view of which
//! models each backend family currently serves.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::llm::LlmClient;

use super::BackendFamily;

struct CatalogInner {
    fast_models: Vec<String>,
    heavy_models: Vec<String>,
    refreshed_at: Instant,
}

/// Single-writer refresher, many lock-free-ish readers (a short-lived mutex
/// guard per read; there is no long-held lock across awaits).
pub struct ModelCatalog {
    inner: Mutex<CatalogInner>,
    ttl: Duration,
    /// Priority-ordered model names per request category, used to pick among
    /// whatever the live catalog reports. Models absent from the live
    /// catalog are never chosen.
    priority: HashMap<String, Vec<String>>,
}

impl ModelCatalog {
    pub fn new(ttl: Duration, priority: HashMap<String, Vec<String>>) -> Self {
        Self {
            inner: Mutex::new(CatalogInner {
                fast_models: Vec::new(),
                heavy_models: Vec::new(),
                refreshed_at: Instant::now() - ttl - Duration::from_secs(1),
            }),
            ttl,
            priority,
        }
    }

    /// Refresh the catalog from each family's client if the TTL has lapsed.
    /// A failed or empty listing keeps the previous catalog rather than
    /// clearing it.
    pub async fn refresh_if_stale(&self, fast: &dyn LlmClient, heavy: &dyn LlmClient) {
        let stale = {
            let inner = self.inner.lock().await;
            inner.refreshed_at.elapsed() >= self.ttl
        };
        if !stale {
            return;
        }
        debug!("ModelCatalog::refresh_if_stale: refreshing");

        let fast_models = match fast.list_models().await {
            Ok(models) if !models.is_empty() => Some(models),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "ModelCatalog::refresh_if_stale: fast family listing failed");
                None
            }
        };
        let heavy_models = match heavy.list_models().await {
            Ok(models) if !models.is_empty() => Some(models),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "ModelCatalog::refresh_if_stale: heavy family listing failed");
                None
            }
        };

        let mut inner = self.inner.lock().await;
        if let Some(models) = fast_models {
            inner.fast_models = models;
        }
        if let Some(models) = heavy_models {
            inner.heavy_models = models;
        }
        inner.refreshed_at = Instant::now();
    }

    /// Pick the best model for `category` within `family`'s live catalog.
    /// Falls back to the family's configured priority list's first entry if
    /// the live catalog is still empty (first run before any successful
    /// refresh), and finally to any model the catalog knows about.
    pub async fn select(&self, family: BackendFamily, category: &str) -> Option<String> {
        let inner = self.inner.lock().await;
        let live = match family {
            BackendFamily::Fast => &inner.fast_models,
            BackendFamily::Heavy => &inner.heavy_models,
        };

        if let Some(priority_list) = self.priority.get(category) {
            if live.is_empty() {
                return priority_list.first().cloned();
            }
            for candidate in priority_list {
                if live.contains(candidate) {
                    return Some(candidate.clone());
                }
            }
        }
        live.first().cloned()
    }

    pub async fn known_models(&self, family: BackendFamily) -> Vec<String> {
        let inner = self.inner.lock().await;
        match family {
            BackendFamily::Fast => inner.fast_models.clone(),
            BackendFamily::Heavy => inner.heavy_models.clone(),
        }
    }

    /// Seed the catalog directly (used at startup before the first
    /// successful live refresh, and by tests).
    pub async fn seed(&self, family: BackendFamily, models: Vec<String>) {
        let mut inner = self.inner.lock().await;
        match family {
            BackendFamily::Fast => inner.fast_models = models,
            BackendFamily::Heavy => inner.heavy_models = models,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn select_prefers_priority_order_within_live_catalog() {
        let mut priority = HashMap::new();
        priority.insert("coding".to_string(), vec!["best-model".to_string(), "ok-model".to_string()]);
        let catalog = ModelCatalog::new(Duration::from_secs(120), priority);
        catalog
            .seed(BackendFamily::Fast, vec!["ok-model".to_string(), "other".to_string()])
            .await;

        let chosen = catalog.select(BackendFamily::Fast, "coding").await;
        assert_eq!(chosen, Some("ok-model".to_string()));
    }

    #[tokio::test]
    async fn select_never_returns_model_outside_live_catalog() {
        let mut priority = HashMap::new();
        priority.insert("coding".to_string(), vec!["nonexistent".to_string()]);
        let catalog = ModelCatalog::new(Duration::from_secs(120), priority);
        catalog.seed(BackendFamily::Fast, vec!["actual-model".to_string()]).await;

        let chosen = catalog.select(BackendFamily::Fast, "coding").await;
        assert_eq!(chosen, Some("actual-model".to_string()));
    }

    #[tokio::test]
    async fn select_falls_back_to_priority_list_before_any_refresh() {
        let mut priority = HashMap::new();
        priority.insert("coding".to_string(), vec!["configured-model".to_string()]);
        let catalog = ModelCatalog::new(Duration::from_secs(120), priority);

        let chosen = catalog.select(BackendFamily::Fast, "coding").await;
        assert_eq!(chosen, Some("configured-model".to_string()));
    }
}
