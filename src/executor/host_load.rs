//! Adaptive concurrency: `effective_N = min(MAX_CONCURRENT, adaptive(...))`.
//!
//! Host load is read via `sysinfo`; the reduction function itself is pure
//! so it's testable without touching the real host.

use sysinfo::System;

/// Current host load as percentages in [0, 100].
#[derive(Debug, Clone, Copy, Default)]
pub struct HostLoad {
    pub cpu_pct: f32,
    pub mem_pct: f32,
}

/// Samples current CPU and memory usage via `sysinfo`.
///
/// `System::new_all()` followed by an immediate `cpu_usage()` read returns
/// 0 on the first call (no baseline to diff against); callers that need an
/// accurate first sample should hold a `System` across calls and call
/// `refresh_cpu_usage`/`refresh_memory` instead. This function is the
/// coarse, no-state convenience path used by the periodic recompute timer.
pub fn sample() -> HostLoad {
    let mut sys = System::new_all();
    sys.refresh_cpu_usage();
    sys.refresh_memory();

    let cpu_pct = if sys.cpus().is_empty() {
        0.0
    } else {
        sys.cpus().iter().map(|c| c.cpu_usage()).sum::<f32>() / sys.cpus().len() as f32
    };
    let mem_pct = if sys.total_memory() == 0 {
        0.0
    } else {
        (sys.used_memory() as f32 / sys.total_memory() as f32) * 100.0
    };

    HostLoad { cpu_pct, mem_pct }
}

/// Pure reduction function: shrink the worker pool as host load climbs,
/// `effective_N = min(MAX_CONCURRENT, adaptive(host_cpu%, host_mem%,
/// router.mlx_active, router.ollama_active))`. `mlx_active`/`ollama_active`
/// are each family's current in-flight count, `max_heavy_mlx`/
/// `max_heavy_ollama` their hard ceilings; once both families are saturated
/// there is nothing the pool could usefully pick up, so it reports 0
/// regardless of host load. A per-task ceiling check still happens at pull
/// time (one family being saturated should not starve the other).
pub fn adaptive(
    max_concurrent: usize,
    load: HostLoad,
    mlx_active: usize,
    max_heavy_mlx: usize,
    ollama_active: usize,
    max_heavy_ollama: usize,
) -> usize {
    let mlx_saturated = max_heavy_mlx > 0 && mlx_active >= max_heavy_mlx;
    let ollama_saturated = max_heavy_ollama > 0 && ollama_active >= max_heavy_ollama;
    if mlx_saturated && ollama_saturated {
        return 0;
    }

    let worst = load.cpu_pct.max(load.mem_pct);
    let fraction = if worst >= 90.0 {
        0.25
    } else if worst >= 75.0 {
        0.5
    } else {
        1.0
    };
    ((max_concurrent as f32) * fraction).floor().max(1.0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_host_uses_full_pool() {
        let n = adaptive(15, HostLoad { cpu_pct: 10.0, mem_pct: 10.0 }, 0, 2, 0, 2);
        assert_eq!(n, 15);
    }

    #[test]
    fn busy_host_halves_the_pool() {
        let n = adaptive(15, HostLoad { cpu_pct: 80.0, mem_pct: 10.0 }, 0, 2, 0, 2);
        assert_eq!(n, 7);
    }

    #[test]
    fn overloaded_host_quarters_the_pool() {
        let n = adaptive(15, HostLoad { cpu_pct: 95.0, mem_pct: 10.0 }, 0, 2, 0, 2);
        assert_eq!(n, 3);
    }

    #[test]
    fn never_returns_zero_from_load_alone() {
        let n = adaptive(1, HostLoad { cpu_pct: 99.0, mem_pct: 99.0 }, 0, 2, 0, 2);
        assert_eq!(n, 1);
    }

    #[test]
    fn both_families_saturated_reports_zero_regardless_of_load() {
        let n = adaptive(15, HostLoad { cpu_pct: 10.0, mem_pct: 10.0 }, 2, 2, 2, 2);
        assert_eq!(n, 0);
    }

    #[test]
    fn one_family_saturated_does_not_starve_the_other() {
        let n = adaptive(15, HostLoad { cpu_pct: 10.0, mem_pct: 10.0 }, 2, 2, 0, 2);
        assert_eq!(n, 15);
    }

    #[test]
    fn zero_ceiling_means_the_family_is_not_gated_by_adaptive() {
        let n = adaptive(15, HostLoad { cpu_pct: 10.0, mem_pct: 10.0 }, 5, 0, 5, 0);
        assert_eq!(n, 15);
    }
}
