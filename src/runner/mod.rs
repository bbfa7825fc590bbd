//! Workflow Runner — preflight, GO/NOT-GO gate, sequential step loop with
//! `onFail` routing, and run summary production (§4.6).

use crate::browser::BrowserEngine;
use crate::checkpoint::CheckpointHandler;
use crate::context::{RunContext, StepResult};
use crate::events::{EventStream, RunEvent};
use crate::executor::StepExecutor;
use crate::patch::PatchPayload;
use crate::recipe::OnFail;
use base64::Engine as _;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

pub struct RunSummary {
    pub ok: bool,
    pub step_results: Vec<StepResult>,
    pub duration_ms: u64,
    pub aborted_at: Option<String>,
    /// Patches the Recovery Pipeline's `authoring_patch` strategy produced
    /// during this run, keyed by the step that triggered them, left for
    /// the caller to apply via the Patch Workflow (§4.5/§4.8).
    pub pending_patches: Vec<(String, PatchPayload)>,
}

pub struct WorkflowRunner<'a> {
    pub executor: StepExecutor<'a>,
    pub checkpoint: &'a dyn CheckpointHandler,
    pub events: &'a EventStream,
    /// §9 Open Question #1: bounds the runner's own automatic retry of an
    /// `onFail = retry` step, independent of the Recovery Pipeline's own
    /// ladder inside the Step Executor. Default `1`.
    pub max_retries: u32,
    /// When set, a `step_<id>.png`/`dom_<id>.html` pair is written here
    /// after every step, per §6's persisted state layout. `None` skips
    /// per-step capture entirely (e.g. for in-process embedding or tests).
    pub persist_dir: Option<&'a Path>,
}

impl<'a> WorkflowRunner<'a> {
    pub async fn run(&self, run_ctx: &RunContext) -> RunSummary {
        let started = Instant::now();
        let total_steps = run_ctx.recipe.workflow.steps.len();
        self.events.publish(RunEvent::RunStart {
            run_id: run_ctx.run_id,
            total_steps,
        });

        if let Some(aborted_at) = self.run_preflight(run_ctx).await {
            return self.abort(started, aborted_at, Vec::new(), Vec::new()).await;
        }

        let go_message = format!(
            "start run for {}/{} ({} steps)",
            run_ctx.recipe.domain, run_ctx.recipe.flow, total_steps
        );
        if !self.checkpoint.request_approval(&go_message, None).await.is_go() {
            return self.abort(started, "go_not_go".to_string(), Vec::new(), Vec::new()).await;
        }

        let mut step_results = Vec::with_capacity(total_steps);
        let mut pending_patches = Vec::new();

        for (index, step) in run_ctx.recipe.workflow.steps.iter().enumerate() {
            self.events.publish(RunEvent::StepStart {
                step_id: step.id.clone(),
                step_index: index,
                op: format!("{:?}", step.op),
            });

            let mut executed = self.executor.execute(step, run_ctx).await;

            if !executed.result.ok && step.on_fail == Some(OnFail::Retry) {
                let mut attempts = 0;
                while attempts < self.max_retries && !executed.result.ok {
                    attempts += 1;
                    info!(step_id = %step.id, attempt = attempts, "retrying step per onFail=retry");
                    executed = self.executor.execute(step, run_ctx).await;
                }
            }

            if let Some(patch) = executed.pending_patch.take() {
                pending_patches.push((step.id.clone(), patch));
            }

            let screenshot_base64 = self.persist_step_artifacts(&step.id).await;

            self.events.publish(RunEvent::StepEnd {
                step_id: executed.result.step_id.clone(),
                step_index: index,
                ok: executed.result.ok,
                duration_ms: executed.result.duration_ms.unwrap_or(0),
                message: executed.result.message.clone(),
                error_type: executed.result.error_type,
                data: executed.result.data.clone(),
                screenshot: screenshot_base64,
            });

            let ok = executed.result.ok;
            step_results.push(executed.result);

            if ok {
                continue;
            }

            match step.on_fail {
                Some(OnFail::Checkpoint) => {
                    let message = format!("step {} failed, continue run?", step.id);
                    if self.checkpoint.request_approval(&message, None).await.is_go() {
                        continue;
                    }
                    return self.abort(started, step.id.clone(), step_results, pending_patches).await;
                }
                // retry's extra attempts are exhausted above; fallback's
                // ladder already ran inside the Step Executor. Both abort
                // the run at this step (§4.6), same as an explicit abort
                // or a step with no onFail configured.
                Some(OnFail::Abort) | Some(OnFail::Retry) | Some(OnFail::Fallback) | None => {
                    return self.abort(started, step.id.clone(), step_results, pending_patches).await;
                }
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        let vars = run_ctx.vars.read().await.clone();
        self.events.publish(RunEvent::RunComplete {
            ok: true,
            total_duration_ms: duration_ms,
            vars,
            aborted_at: None,
            summary: None,
        });

        RunSummary {
            ok: true,
            step_results,
            duration_ms,
            aborted_at: None,
            pending_patches,
        }
    }

    /// Writes `step_<id>.png`/`dom_<id>.html` under `persist_dir` if one is
    /// configured (§6). Best-effort: a capture failure is logged and
    /// skipped rather than failing the step. Returns the screenshot as
    /// base64 for the `StepEnd` event when one was captured.
    async fn persist_step_artifacts(&self, step_id: &str) -> Option<String> {
        let dir = self.persist_dir?;

        let screenshot_base64 = match self.executor.engine.screenshot(None).await {
            Ok(bytes) if !bytes.is_empty() => {
                let path = dir.join(format!("step_{step_id}.png"));
                if let Err(e) = tokio::fs::write(&path, &bytes).await {
                    warn!(step_id, error = %e, "failed to persist step screenshot");
                }
                Some(base64::engine::general_purpose::STANDARD.encode(&bytes))
            }
            _ => None,
        };

        if let Ok(dom) = self.executor.engine.extract(None, None).await {
            if !dom.is_null() {
                let body = dom.as_str().map(str::to_string).unwrap_or_else(|| dom.to_string());
                let path = dir.join(format!("dom_{step_id}.html"));
                if let Err(e) = tokio::fs::write(&path, body).await {
                    warn!(step_id, error = %e, "failed to persist step dom snippet");
                }
            }
        }

        screenshot_base64
    }

    /// §4.6 preflight: only `urlContains` fingerprints gate the run.
    /// `mustText`/`mustSelectors` are advisory per-page guards, not checked
    /// here.
    async fn run_preflight(&self, run_ctx: &RunContext) -> Option<String> {
        let current_url = self.executor.engine.current_url().await.ok()?;
        for fingerprint in &run_ctx.recipe.fingerprints {
            if let Some(expected) = &fingerprint.url_contains {
                if !current_url.contains(expected.as_str()) {
                    warn!(expected, current_url, "preflight fingerprint mismatch");
                    return Some("preflight".to_string());
                }
            }
        }
        None
    }

    async fn abort(
        &self,
        started: Instant,
        aborted_at: String,
        step_results: Vec<StepResult>,
        pending_patches: Vec<(String, PatchPayload)>,
    ) -> RunSummary {
        let duration_ms = started.elapsed().as_millis() as u64;
        self.events.publish(RunEvent::RunComplete {
            ok: false,
            total_duration_ms: duration_ms,
            vars: serde_json::json!({}),
            aborted_at: Some(aborted_at.clone()),
            summary: None,
        });

        RunSummary {
            ok: false,
            step_results,
            duration_ms,
            aborted_at: Some(aborted_at),
            pending_patches,
        }
    }
}
