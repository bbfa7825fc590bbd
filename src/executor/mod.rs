//! Step Executor — dispatches a single `Step` by `op`, enforces its
//! `expect` list, and hands any not-ok result to the Recovery Pipeline
//! (§4.4).

mod interpolate;

use crate::browser::{BrowserEngine, FallbackCapableEngine};
use crate::checkpoint::CheckpointHandler;
use crate::context::{ErrorType, RunContext, StepResult};
use crate::healing::HealingMemory;
use crate::metrics::MetricsCollector;
use crate::patch::PatchPayload;
use crate::planner::PatchPlanner;
use crate::recipe::{ActionRef, Expectation, ExpectationKind, Op, Step};
use crate::recovery::{self, FailureContext, RecoveryDeps};
use serde_json::Value;
use std::time::Instant;

struct DispatchOutcome {
    ok: bool,
    error_type: Option<ErrorType>,
    message: Option<String>,
    data: Option<Value>,
    failed_selector: Option<String>,
    failed_action: Option<ActionRef>,
}

impl DispatchOutcome {
    fn ok(data: Option<Value>) -> Self {
        Self {
            ok: true,
            error_type: None,
            message: None,
            data,
            failed_selector: None,
            failed_action: None,
        }
    }

    fn fail(error_type: Option<ErrorType>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error_type,
            message: Some(message.into()),
            data: None,
            failed_selector: None,
            failed_action: None,
        }
    }
}

/// The outcome of executing one step, including whether a patch was
/// produced by the Recovery Pipeline's `authoring_patch` action for the
/// caller to apply via the Patch Workflow.
pub struct ExecutedStep {
    pub result: StepResult,
    pub pending_patch: Option<PatchPayload>,
}

pub struct StepExecutor<'a> {
    pub engine: &'a dyn FallbackCapableEngine,
    pub healing_memory: &'a HealingMemory,
    pub patch_planner: Option<&'a dyn PatchPlanner>,
    pub checkpoint: &'a dyn CheckpointHandler,
    pub metrics: &'a MetricsCollector,
}

impl<'a> StepExecutor<'a> {
    pub async fn execute(&self, step: &Step, run_ctx: &RunContext) -> ExecutedStep {
        let started = Instant::now();
        let vars_snapshot = run_ctx.vars.read().await.clone();
        let args = interpolate::interpolate(&step.args, &vars_snapshot);

        let mut outcome = self.dispatch(step, &args, run_ctx).await;

        if outcome.ok {
            if let Some(failed) = self.check_expectations(step, run_ctx).await {
                outcome = DispatchOutcome::fail(Some(ErrorType::ExpectationFailed), failed);
            }
        }

        let mut recovery_method = None;
        let mut pending_patch = None;

        if !outcome.ok {
            if let Some(error_type) = outcome.error_type {
                let url = self.engine.current_url().await.unwrap_or_default();
                let title = self.engine.current_title().await.ok();
                let failure_ctx = FailureContext {
                    step_id: step.id.clone(),
                    error_type,
                    url,
                    title,
                    failed_selector: outcome.failed_selector.clone(),
                    failed_action: outcome.failed_action.clone(),
                    target_key: step.target_key.clone(),
                };

                let deps = RecoveryDeps {
                    engine: self.engine,
                    healing_memory: self.healing_memory,
                    patch_planner: self.patch_planner,
                    checkpoint: self.checkpoint,
                    metrics: self.metrics,
                    budget: run_ctx.budget.as_ref(),
                    recipe: &run_ctx.recipe,
                };

                let recovered = recovery::run(&failure_ctx, &deps).await;
                pending_patch = recovered.pending_patch;

                if recovered.recovered {
                    recovery_method = Some(recovered.method.clone());
                    outcome = DispatchOutcome::ok(None);
                    outcome.message = Some(format!("Recovered via {}", recovered.method));
                }
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        let result = if outcome.ok {
            let mut r = StepResult::ok(step.id.clone(), duration_ms);
            if let Some(message) = outcome.message {
                r = r.with_message(message);
            }
            if let Some(data) = outcome.data {
                r = r.with_data(data);
            }
            r
        } else {
            StepResult::fail(
                step.id.clone(),
                outcome.error_type.unwrap_or(ErrorType::Unknown),
                outcome.message.unwrap_or_default(),
                duration_ms,
            )
        };

        self.metrics.record_step(result.clone(), recovery_method);

        ExecutedStep { result, pending_patch }
    }

    async fn dispatch(&self, step: &Step, args: &Value, run_ctx: &RunContext) -> DispatchOutcome {
        match step.op {
            Op::Goto => self.dispatch_goto(args).await,
            Op::ActCached => self.dispatch_act_cached(step, run_ctx).await,
            Op::ActTemplate => self.dispatch_act_template(step, args, run_ctx).await,
            Op::Extract => self.dispatch_extract(args, run_ctx).await,
            Op::Choose => self.dispatch_choose(args, run_ctx).await,
            Op::Checkpoint => self.dispatch_checkpoint(args, run_ctx).await,
            Op::Wait => self.dispatch_wait(args).await,
        }
    }

    async fn dispatch_goto(&self, args: &Value) -> DispatchOutcome {
        let Some(url) = args.get("url").and_then(|v| v.as_str()) else {
            return DispatchOutcome::fail(Some(ErrorType::Navigation), "goto requires args.url");
        };
        match self.engine.goto(url).await {
            Ok(()) => DispatchOutcome::ok(None),
            Err(e) => DispatchOutcome::fail(Some(ErrorType::Navigation), e.to_string()),
        }
    }

    async fn dispatch_act_cached(&self, step: &Step, run_ctx: &RunContext) -> DispatchOutcome {
        let Some(target_key) = &step.target_key else {
            return DispatchOutcome::fail(Some(ErrorType::TargetNotFound), "act_cached requires targetKey");
        };
        let Some(action_entry) = run_ctx.recipe.actions.get(target_key) else {
            return DispatchOutcome::fail(Some(ErrorType::TargetNotFound), format!("no cached action for {target_key}"));
        };
        let action = action_entry.preferred.clone();

        match self.engine.act(&action).await {
            Ok(true) => DispatchOutcome::ok(None),
            Ok(false) => {
                let mut outcome = DispatchOutcome::fail(Some(ErrorType::TargetNotFound), "cached action did not match");
                outcome.failed_selector = Some(action.selector.clone());
                outcome.failed_action = Some(action);
                outcome
            }
            Err(e) => {
                let mut outcome = DispatchOutcome::fail(Some(ErrorType::TargetNotFound), e.to_string());
                outcome.failed_selector = Some(action.selector.clone());
                outcome.failed_action = Some(action);
                outcome
            }
        }
    }

    async fn dispatch_act_template(&self, step: &Step, _args: &Value, run_ctx: &RunContext) -> DispatchOutcome {
        let Some(target_key) = &step.target_key else {
            return DispatchOutcome::fail(Some(ErrorType::TargetNotFound), "act_template requires targetKey");
        };
        let Some(action_entry) = run_ctx.recipe.actions.get(target_key) else {
            return DispatchOutcome::fail(Some(ErrorType::TargetNotFound), format!("no cached action for {target_key}"));
        };
        let action = action_entry.preferred.clone();

        match self.engine.act(&action).await {
            Ok(true) => DispatchOutcome::ok(None),
            Ok(false) => {
                let mut outcome = DispatchOutcome::fail(Some(ErrorType::TargetNotFound), "templated action did not match");
                outcome.failed_selector = Some(action.selector.clone());
                outcome.failed_action = Some(action);
                outcome
            }
            Err(e) => {
                let mut outcome = DispatchOutcome::fail(Some(ErrorType::TargetNotFound), e.to_string());
                outcome.failed_selector = Some(action.selector.clone());
                outcome.failed_action = Some(action);
                outcome
            }
        }
    }

    async fn dispatch_extract(&self, args: &Value, run_ctx: &RunContext) -> DispatchOutcome {
        let schema = args.get("schema");
        let scope = args.get("scope").and_then(|v| v.as_str());
        let into = args.get("into").and_then(|v| v.as_str());

        match self.engine.extract(schema, scope).await {
            Ok(Value::Null) => DispatchOutcome::fail(Some(ErrorType::ExtractionEmpty), "extraction returned no data"),
            Ok(value) => {
                if let Some(into) = into {
                    run_ctx.set_var(into, value.clone()).await;
                }
                DispatchOutcome::ok(Some(value))
            }
            Err(e) => DispatchOutcome::fail(Some(ErrorType::ExtractionEmpty), e.to_string()),
        }
    }

    async fn dispatch_choose(&self, args: &Value, run_ctx: &RunContext) -> DispatchOutcome {
        let Some(from) = args.get("from").and_then(|v| v.as_str()) else {
            return DispatchOutcome::fail(None, "choose requires args.from");
        };
        let Some(policy_key) = args.get("policy").and_then(|v| v.as_str()) else {
            return DispatchOutcome::fail(None, "choose requires args.policy");
        };
        let Some(into) = args.get("into").and_then(|v| v.as_str()) else {
            return DispatchOutcome::fail(None, "choose requires args.into");
        };

        let Some(candidates) = run_ctx.get_var(from).await else {
            return DispatchOutcome::fail(None, format!("vars.{from} is not set"));
        };
        let Value::Array(candidates) = candidates else {
            return DispatchOutcome::fail(None, format!("vars.{from} is not a list"));
        };
        let Some(policy) = run_ctx.recipe.policies.get(policy_key) else {
            return DispatchOutcome::fail(None, format!("no such policy {policy_key}"));
        };

        match crate::policy::evaluate(&candidates, policy) {
            Some(index) => {
                let winner = candidates[index].clone();
                run_ctx.set_var(into, winner.clone()).await;
                DispatchOutcome::ok(Some(winner))
            }
            // §4.4: no winner is a step failure carrying no error type.
            None => DispatchOutcome::fail(None, "no candidate satisfied the policy"),
        }
    }

    async fn dispatch_checkpoint(&self, args: &Value, run_ctx: &RunContext) -> DispatchOutcome {
        let message = args.get("message").and_then(|v| v.as_str()).unwrap_or("continue?");

        let screenshot = if run_ctx.budget.can_take_screenshot(true) {
            let shot = self.engine.screenshot(None).await.ok();
            if shot.is_some() {
                run_ctx.budget.record_screenshot(true);
            }
            shot
        } else {
            None
        };

        let decision = self.checkpoint.request_approval(message, screenshot.as_deref()).await;
        if decision.is_go() {
            DispatchOutcome::ok(None)
        } else {
            DispatchOutcome::fail(None, "operator declined at checkpoint")
        }
    }

    async fn dispatch_wait(&self, args: &Value) -> DispatchOutcome {
        let ms = args.get("ms").and_then(|v| v.as_u64()).unwrap_or(0);
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
        DispatchOutcome::ok(None)
    }

    /// Evaluates `step.expect`, returning `Some(description)` of every
    /// failed expectation joined together, or `None` if all passed (§4.4).
    async fn check_expectations(&self, step: &Step, run_ctx: &RunContext) -> Option<String> {
        if step.expect.is_empty() {
            return None;
        }

        let mut failed = Vec::new();
        for expectation in &step.expect {
            if !self.expectation_holds(expectation, run_ctx).await {
                failed.push(format!("{:?}:{}", expectation.kind, expectation.value));
            }
        }

        if failed.is_empty() {
            None
        } else {
            Some(format!("failed expectations: {}", failed.join(", ")))
        }
    }

    async fn expectation_holds(&self, expectation: &Expectation, _run_ctx: &RunContext) -> bool {
        match expectation.kind {
            ExpectationKind::UrlContains => self
                .engine
                .current_url()
                .await
                .map(|url| url.contains(&expectation.value))
                .unwrap_or(false),
            ExpectationKind::TitleContains => self
                .engine
                .current_title()
                .await
                .map(|title| title.contains(&expectation.value))
                .unwrap_or(false),
            ExpectationKind::SelectorVisible => self
                .engine
                .screenshot(Some(&expectation.value))
                .await
                .map(|bytes| !bytes.is_empty())
                .unwrap_or(false),
            ExpectationKind::TextContains => match self.engine.extract(None, None).await {
                Ok(Value::String(text)) => text.contains(&expectation.value),
                Ok(Value::Null) | Err(_) => false,
                Ok(other) => other.to_string().contains(&expectation.value),
            },
        }
    }
}
