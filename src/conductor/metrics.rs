//! Counters surfaced by `GET /metrics` in Prometheus text-exposition format.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct ConductorMetrics {
    understand_cache_accesses: AtomicU64,
    fanout_runs: AtomicU64,
    tasks_deferred_to_human: AtomicU64,
}

impl ConductorMetrics {
    pub fn record_understand_cache_access(&self) {
        self.understand_cache_accesses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fanout(&self) {
        self.fanout_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deferred_to_human(&self) {
        self.tasks_deferred_to_human.fetch_add(1, Ordering::Relaxed);
    }

    /// Render as Prometheus text exposition format.
    pub fn render(&self) -> String {
        format!(
            "# TYPE orchestrator_understand_cache_accesses_total counter\n\
             orchestrator_understand_cache_accesses_total {}\n\
             # TYPE orchestrator_fanout_runs_total counter\n\
             orchestrator_fanout_runs_total {}\n\
             # TYPE orchestrator_tasks_deferred_to_human_total counter\n\
             orchestrator_tasks_deferred_to_human_total {}\n",
            self.understand_cache_accesses.load(Ordering::Relaxed),
            self.fanout_runs.load(Ordering::Relaxed),
            self.tasks_deferred_to_human.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_all_counters() {
        let metrics = ConductorMetrics::default();
        metrics.record_understand_cache_access();
        metrics.record_fanout();
        let text = metrics.render();
        assert!(text.contains("orchestrator_understand_cache_accesses_total 1"));
        assert!(text.contains("orchestrator_fanout_runs_total 1"));
        assert!(text.contains("orchestrator_tasks_deferred_to_human_total 0"));
    }
}
