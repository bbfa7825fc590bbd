//! Metrics Collector & Aggregator (§4.9).
//!
//! The collector accumulates counters for a single run; `finalize` freezes
//! them into a `RunMetrics` snapshot and writes the run's `logs.jsonl` and
//! `summary.md` artifacts (§6/§7/§8), grounded on the teacher's plain-text
//! `print_banner`-style status reporting in `src/main.rs` rather than a
//! templating engine.

mod aggregate;

pub use aggregate::{AggregateReport, Aggregator, SloCompliance};

use crate::context::{ErrorType, StepResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StepCounts {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub recovered: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetrics {
    pub run_id: Uuid,
    pub flow: String,
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub success: bool,
    pub duration_ms: u64,
    pub llm_calls: u32,
    pub token_usage: usize,
    pub patch_count: u32,
    pub patch_success_rate: f64,
    pub healing_memory_hits: u32,
    pub healing_memory_misses: u32,
    pub checkpoint_wait_ms: u64,
    pub step_results: StepCounts,
    pub fallback_ladder_usage: HashMap<String, u32>,
}

#[derive(Debug, Default)]
struct Accumulator {
    logged_steps: Vec<(StepResult, Option<String>)>,
    llm_calls: u32,
    token_usage: usize,
    patches_attempted: u32,
    patches_ok: u32,
    healing_hits: u32,
    healing_misses: u32,
    checkpoint_wait_ms: u64,
    fallback_ladder_usage: HashMap<String, u32>,
    recovered_steps: u32,
}

/// Per-run counters. One instance per `RunContext`; not shared across runs.
pub struct MetricsCollector {
    run_id: Uuid,
    flow: String,
    version: String,
    started_at: DateTime<Utc>,
    state: Mutex<Accumulator>,
}

impl MetricsCollector {
    pub fn new(run_id: Uuid, flow: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            run_id,
            flow: flow.into(),
            version: version.into(),
            started_at: Utc::now(),
            state: Mutex::new(Accumulator::default()),
        }
    }

    pub fn record_step(&self, result: StepResult, recovery_method: Option<String>) {
        if result.ok && recovery_method.is_some() {
            self.state.lock().recovered_steps += 1;
        }
        self.state.lock().logged_steps.push((result, recovery_method));
    }

    pub fn record_llm_call(&self, prompt_chars: usize, completion_chars: usize) {
        let mut state = self.state.lock();
        state.llm_calls += 1;
        state.token_usage += prompt_chars + completion_chars;
    }

    pub fn record_patch(&self, ok: bool) {
        let mut state = self.state.lock();
        state.patches_attempted += 1;
        if ok {
            state.patches_ok += 1;
        }
    }

    pub fn record_healing_memory(&self, hit: bool) {
        let mut state = self.state.lock();
        if hit {
            state.healing_hits += 1;
        } else {
            state.healing_misses += 1;
        }
    }

    pub fn record_checkpoint_wait(&self, ms: u64) {
        self.state.lock().checkpoint_wait_ms += ms;
    }

    /// Every attempted recovery action increments its method's counter,
    /// independent of whether it succeeded (§4.5).
    pub fn record_ladder_attempt(&self, method: &str) {
        *self
            .state
            .lock()
            .fallback_ladder_usage
            .entry(method.to_string())
            .or_insert(0) += 1;
    }

    /// Freezes the accumulated counters into a `RunMetrics`, writing
    /// `logs.jsonl` and `summary.md` under `run_dir` (§6/§7/§8).
    pub async fn finalize(self, success: bool, run_dir: &Path) -> crate::error::Result<RunMetrics> {
        let completed_at = Utc::now();
        let duration_ms = (completed_at - self.started_at).num_milliseconds().max(0) as u64;
        let state = self.state.into_inner();

        let mut counts = StepCounts::default();
        for (result, _) in &state.logged_steps {
            counts.total += 1;
            if result.ok {
                counts.passed += 1;
            } else {
                counts.failed += 1;
            }
        }
        counts.recovered = state.recovered_steps;

        let patch_success_rate = if state.patches_attempted == 0 {
            0.0
        } else {
            state.patches_ok as f64 / state.patches_attempted as f64
        };

        let metrics = RunMetrics {
            run_id: self.run_id,
            flow: self.flow,
            version: self.version,
            started_at: self.started_at,
            completed_at,
            success,
            duration_ms,
            llm_calls: state.llm_calls,
            token_usage: state.token_usage,
            patch_count: state.patches_attempted,
            patch_success_rate,
            healing_memory_hits: state.healing_hits,
            healing_memory_misses: state.healing_misses,
            checkpoint_wait_ms: state.checkpoint_wait_ms,
            step_results: counts,
            fallback_ladder_usage: state.fallback_ladder_usage,
        };

        tokio::fs::create_dir_all(run_dir).await?;
        write_logs_jsonl(run_dir, &state.logged_steps).await?;
        write_summary_md(run_dir, &metrics, &state.logged_steps).await?;

        Ok(metrics)
    }
}

async fn write_logs_jsonl(
    run_dir: &Path,
    steps: &[(StepResult, Option<String>)],
) -> crate::error::Result<()> {
    let mut body = String::new();
    for (result, recovery_method) in steps {
        let mut line = serde_json::to_value(result)?;
        if let (Some(method), Some(obj)) = (recovery_method, line.as_object_mut()) {
            obj.insert("recoveryMethod".to_string(), serde_json::Value::String(method.clone()));
        }
        body.push_str(&serde_json::to_string(&line)?);
        body.push('\n');
    }
    tokio::fs::write(run_dir.join("logs.jsonl"), body).await?;
    Ok(())
}

async fn write_summary_md(
    run_dir: &Path,
    metrics: &RunMetrics,
    steps: &[(StepResult, Option<String>)],
) -> crate::error::Result<()> {
    let mut out = String::new();
    out.push_str(&format!("# Run {}\n\n", metrics.run_id));
    out.push_str(&format!("- flow: {} ({})\n", metrics.flow, metrics.version));
    out.push_str(&format!("- success: {}\n", metrics.success));
    out.push_str(&format!("- duration: {} ms\n", metrics.duration_ms));
    out.push_str(&format!(
        "- steps: {} passed, {} failed, {} recovered (of {})\n",
        metrics.step_results.passed, metrics.step_results.failed, metrics.step_results.recovered, metrics.step_results.total
    ));
    out.push_str(&format!("- llm calls: {}\n", metrics.llm_calls));
    out.push_str(&format!("- patches: {} ({:.0}% applied)\n\n", metrics.patch_count, metrics.patch_success_rate * 100.0));

    let failed: Vec<_> = steps.iter().filter(|(r, _)| !r.ok).collect();
    if !failed.is_empty() {
        out.push_str("## Failed steps\n\n");
        for (result, _) in failed {
            out.push_str(&format!(
                "- `{}`: {:?} — {}\n",
                result.step_id,
                result.error_type,
                result.message.as_deref().unwrap_or("")
            ));
        }
    }

    tokio::fs::write(run_dir.join("summary.md"), out).await?;
    Ok(())
}

/// Picks the §4.4/§4.5 classification of an `anyhow` failure into the
/// crate's `ErrorType` taxonomy when no more specific classification
/// applies. Unrecognized payloads become `Unknown` (§4.4).
pub fn classify_error(message: &str) -> ErrorType {
    let lower = message.to_lowercase();
    if lower.contains("captcha") || lower.contains("2fa") || lower.contains("two-factor") {
        ErrorType::CaptchaOr2FA
    } else if lower.contains("canvas") {
        ErrorType::CanvasDetected
    } else if lower.contains("timeout") && lower.contains("authoring") {
        ErrorType::AuthoringServiceTimeout
    } else if lower.contains("navigat") {
        ErrorType::Navigation
    } else if lower.contains("not found") || lower.contains("no such element") || lower.contains("selector") {
        ErrorType::TargetNotFound
    } else {
        ErrorType::Unknown
    }
}
