//! Per-stage latency guardrails surfaced by `GET /status`.
//!
//! Three clocks are tracked: `embed_ms` and `prepare_ms` (Retrieval's own
//! stages) and `llm_plan_ms` (recorded by the Conductor's planner call,
//! against the same tracker, since the status endpoint reports all three
//! together).

use std::time::Duration;

use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Embed,
    Prepare,
    LlmPlan,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StageSnapshot {
    pub last_ms: u64,
    pub slow_at_least_once: bool,
}

#[derive(Debug, Default)]
struct Stats {
    embed: StageSnapshot,
    prepare: StageSnapshot,
    llm_plan: StageSnapshot,
    slow_count: u64,
    last_slow_at_ms: Option<i64>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct LatencySnapshot {
    pub embed_ms: u64,
    pub prepare_ms: u64,
    pub llm_plan_ms: u64,
    pub slow_count: u64,
    pub last_slow_at: Option<i64>,
    pub thresholds_ms: ThresholdsMs,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ThresholdsMs {
    pub embed: u64,
    pub prepare: u64,
    pub llm_plan: u64,
}

/// Tracks the last-observed duration per stage plus a running count of how
/// many times any stage exceeded its configured ceiling.
pub struct LatencyTracker {
    stats: Mutex<Stats>,
    thresholds: ThresholdsMs,
}

impl LatencyTracker {
    pub fn new(embed_ceiling_ms: u64, prepare_ceiling_ms: u64, llm_plan_ceiling_ms: u64) -> Self {
        Self {
            stats: Mutex::new(Stats::default()),
            thresholds: ThresholdsMs {
                embed: embed_ceiling_ms,
                prepare: prepare_ceiling_ms,
                llm_plan: llm_plan_ceiling_ms,
            },
        }
    }

    pub async fn record(&self, stage: Stage, elapsed: Duration, now_ms: i64) {
        let ms = elapsed.as_millis() as u64;
        let ceiling = match stage {
            Stage::Embed => self.thresholds.embed,
            Stage::Prepare => self.thresholds.prepare,
            Stage::LlmPlan => self.thresholds.llm_plan,
        };
        let slow = ms > ceiling;

        let mut stats = self.stats.lock().await;
        let snapshot = StageSnapshot {
            last_ms: ms,
            slow_at_least_once: slow,
        };
        match stage {
            Stage::Embed => stats.embed = snapshot,
            Stage::Prepare => stats.prepare = snapshot,
            Stage::LlmPlan => stats.llm_plan = snapshot,
        }
        if slow {
            stats.slow_count += 1;
            stats.last_slow_at_ms = Some(now_ms);
        }
    }

    pub async fn snapshot(&self) -> LatencySnapshot {
        let stats = self.stats.lock().await;
        LatencySnapshot {
            embed_ms: stats.embed.last_ms,
            prepare_ms: stats.prepare.last_ms,
            llm_plan_ms: stats.llm_plan.last_ms,
            slow_count: stats.slow_count,
            last_slow_at: stats.last_slow_at_ms,
            thresholds_ms: ThresholdsMs {
                embed: self.thresholds.embed,
                prepare: self.thresholds.prepare,
                llm_plan: self.thresholds.llm_plan,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_slow_stage() {
        let tracker = LatencyTracker::new(10, 10, 10);
        tracker.record(Stage::Embed, Duration::from_millis(50), 1000).await;
        let snap = tracker.snapshot().await;
        assert_eq!(snap.embed_ms, 50);
        assert_eq!(snap.slow_count, 1);
        assert_eq!(snap.last_slow_at, Some(1000));
    }

    #[tokio::test]
    async fn fast_stage_does_not_increment_slow_count() {
        let tracker = LatencyTracker::new(100, 100, 100);
        tracker.record(Stage::Prepare, Duration::from_millis(5), 1000).await;
        let snap = tracker.snapshot().await;
        assert_eq!(snap.slow_count, 0);
    }
}
