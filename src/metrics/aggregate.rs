use super::RunMetrics;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SloCompliance {
    pub llm_calls_per_run: f64,
    pub llm_calls_per_run_ok: bool,
    pub second_run_success_rate: f64,
    pub second_run_success_rate_ok: bool,
    pub post_patch_recovery_rate: f64,
    pub post_patch_recovery_rate_ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateReport {
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub avg_llm_calls_per_run: f64,
    pub avg_tokens_per_run: f64,
    pub patch_rate: f64,
    pub post_patch_recovery_rate: f64,
    pub healing_memory_hit_rate: f64,
    pub avg_checkpoint_wait_ms: f64,
    pub fallback_ladder_distribution: HashMap<String, u32>,
    pub by_flow: HashMap<String, AggregateReport>,
    pub slo: SloCompliance,
}

/// Rolls a set of `RunMetrics` up into the §4.9 aggregate report, including
/// the SLO compliance block.
pub struct Aggregator;

impl Aggregator {
    pub fn aggregate(runs: &[RunMetrics]) -> AggregateReport {
        aggregate_inner(runs, true)
    }
}

fn aggregate_inner(runs: &[RunMetrics], with_by_flow: bool) -> AggregateReport {
    let n = runs.len().max(1) as f64;

    let success_rate = runs.iter().filter(|r| r.success).count() as f64 / n;
    let avg_duration_ms = runs.iter().map(|r| r.duration_ms as f64).sum::<f64>() / n;
    let avg_llm_calls_per_run = runs.iter().map(|r| r.llm_calls as f64).sum::<f64>() / n;
    let avg_tokens_per_run = runs.iter().map(|r| r.token_usage as f64).sum::<f64>() / n;

    let patched_runs: Vec<&RunMetrics> = runs.iter().filter(|r| r.patch_count > 0).collect();
    let patch_rate = patched_runs.len() as f64 / n;
    let post_patch_recovery_rate = if patched_runs.is_empty() {
        0.0
    } else {
        patched_runs.iter().map(|r| r.patch_success_rate).sum::<f64>() / patched_runs.len() as f64
    };

    let total_hits: u32 = runs.iter().map(|r| r.healing_memory_hits).sum();
    let total_misses: u32 = runs.iter().map(|r| r.healing_memory_misses).sum();
    let healing_memory_hit_rate = if total_hits + total_misses == 0 {
        0.0
    } else {
        total_hits as f64 / (total_hits + total_misses) as f64
    };

    let avg_checkpoint_wait_ms = runs.iter().map(|r| r.checkpoint_wait_ms as f64).sum::<f64>() / n;

    let mut fallback_ladder_distribution: HashMap<String, u32> = HashMap::new();
    for run in runs {
        for (method, count) in &run.fallback_ladder_usage {
            *fallback_ladder_distribution.entry(method.clone()).or_insert(0) += count;
        }
    }

    let second_run_success_rate = second_run_success_rate(runs);

    let slo = SloCompliance {
        llm_calls_per_run: avg_llm_calls_per_run,
        llm_calls_per_run_ok: avg_llm_calls_per_run <= 0.2,
        second_run_success_rate,
        second_run_success_rate_ok: second_run_success_rate >= 0.95,
        post_patch_recovery_rate,
        post_patch_recovery_rate_ok: post_patch_recovery_rate >= 0.80,
    };

    let by_flow = if with_by_flow {
        let mut grouped: HashMap<String, Vec<RunMetrics>> = HashMap::new();
        for run in runs {
            grouped.entry(run.flow.clone()).or_default().push(run.clone());
        }
        grouped
            .into_iter()
            .map(|(flow, runs)| (flow, aggregate_inner(&runs, false)))
            .collect()
    } else {
        HashMap::new()
    };

    AggregateReport {
        success_rate,
        avg_duration_ms,
        avg_llm_calls_per_run,
        avg_tokens_per_run,
        patch_rate,
        post_patch_recovery_rate,
        healing_memory_hit_rate,
        avg_checkpoint_wait_ms,
        fallback_ladder_distribution,
        by_flow,
        slo,
    }
}

/// Sort by `startedAt`, the first run per flow is the seed and excluded,
/// average `success` over the remainder. `1.0` if there are no second runs
/// yet (§4.9).
fn second_run_success_rate(runs: &[RunMetrics]) -> f64 {
    let mut by_flow: HashMap<&str, Vec<&RunMetrics>> = HashMap::new();
    for run in runs {
        by_flow.entry(&run.flow).or_default().push(run);
    }

    let mut total = 0usize;
    let mut successes = 0usize;
    for runs in by_flow.values_mut() {
        runs.sort_by_key(|r| r.started_at);
        for run in runs.iter().skip(1) {
            total += 1;
            if run.success {
                successes += 1;
            }
        }
    }

    if total == 0 {
        1.0
    } else {
        successes as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn run(flow: &str, success: bool, offset_mins: i64) -> RunMetrics {
        RunMetrics {
            run_id: Uuid::new_v4(),
            flow: flow.to_string(),
            version: "v001".to_string(),
            started_at: Utc::now() + Duration::minutes(offset_mins),
            completed_at: Utc::now() + Duration::minutes(offset_mins),
            success,
            duration_ms: 100,
            llm_calls: 0,
            token_usage: 0,
            patch_count: 0,
            patch_success_rate: 0.0,
            healing_memory_hits: 0,
            healing_memory_misses: 0,
            checkpoint_wait_ms: 0,
            step_results: super::super::StepCounts::default(),
            fallback_ladder_usage: HashMap::new(),
        }
    }

    #[test]
    fn no_second_runs_yet_reports_one() {
        let runs = vec![run("login", true, 0)];
        assert_eq!(second_run_success_rate(&runs), 1.0);
    }

    #[test]
    fn second_run_success_rate_excludes_seed_run() {
        let runs = vec![
            run("login", false, 0),
            run("login", true, 1),
            run("login", true, 2),
        ];
        assert_eq!(second_run_success_rate(&runs), 1.0);
    }

    #[test]
    fn aggregate_computes_slo_block() {
        let runs = vec![run("login", true, 0), run("login", true, 1)];
        let report = Aggregator::aggregate(&runs);
        assert_eq!(report.success_rate, 1.0);
        assert!(report.slo.llm_calls_per_run_ok);
    }
}
