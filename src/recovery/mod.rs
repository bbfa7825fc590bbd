//! Recovery Pipeline — given a failed step, builds and runs the ordered
//! `RecoveryPlan` of strategies the router table in §4.5 assigns to the
//! step's `errorType`.
//!
//! Each strategy is its own module implementing the shared `RecoveryAction`
//! trait, grounded on the teacher's per-engine trait objects in its own
//! `src/traits.rs`. The router constructs a fresh `Vec<Box<dyn
//! RecoveryAction>>` per failure — the actions themselves hold no state,
//! only borrowed capability handles.

mod authoring_patch;
mod checkpoint;
mod healing_memory;
mod observe_refresh;
mod retry;
mod selector_fallback;

use crate::browser::FallbackCapableEngine;
use crate::budget::BudgetGuard;
use crate::checkpoint::CheckpointHandler;
use crate::context::ErrorType;
use crate::healing::HealingMemory;
use crate::metrics::MetricsCollector;
use crate::patch::PatchPayload;
use crate::planner::PatchPlanner;
use crate::recipe::{ActionRef, Recipe};
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct FailureContext {
    pub step_id: String,
    pub error_type: ErrorType,
    pub url: String,
    pub title: Option<String>,
    pub failed_selector: Option<String>,
    pub failed_action: Option<ActionRef>,
    /// The `targetKey` the failing step was driving. Not part of the
    /// literal §4.5 field list, but required to implement the
    /// `selector_fallback`/`healing_memory` contracts, which key off it;
    /// the Step Executor always has it in hand when a failure occurs.
    pub target_key: Option<String>,
}

#[derive(Debug, Default)]
pub struct RecoveryOutcome {
    pub recovered: bool,
    pub method: String,
    pub message: Option<String>,
    /// Set by `authoring_patch` when a patch was produced but not yet
    /// applied (application is the Patch Workflow's job, §4.5/§4.8).
    pub pending_patch: Option<PatchPayload>,
}

impl RecoveryOutcome {
    fn not_recovered(method: &str) -> Self {
        Self {
            recovered: false,
            method: method.to_string(),
            message: None,
            pending_patch: None,
        }
    }

    fn recovered(method: &str, message: impl Into<String>) -> Self {
        Self {
            recovered: true,
            method: method.to_string(),
            message: Some(message.into()),
            pending_patch: None,
        }
    }
}

pub struct RecoveryDeps<'a> {
    pub engine: &'a dyn FallbackCapableEngine,
    pub healing_memory: &'a HealingMemory,
    pub patch_planner: Option<&'a dyn PatchPlanner>,
    pub checkpoint: &'a dyn CheckpointHandler,
    pub metrics: &'a MetricsCollector,
    pub budget: &'a BudgetGuard,
    pub recipe: &'a Recipe,
}

#[async_trait]
pub(crate) trait RecoveryAction: Send + Sync {
    fn method_name(&self) -> &'static str;
    async fn attempt(&self, ctx: &FailureContext, deps: &RecoveryDeps<'_>) -> RecoveryOutcome;
}

fn build_plan(error_type: ErrorType) -> Vec<Box<dyn RecoveryAction>> {
    use ErrorType::*;

    let methods: &[&str] = match error_type {
        TargetNotFound => &["retry", "selector_fallback", "observe_refresh", "healing_memory", "authoring_patch", "checkpoint"],
        ExpectationFailed => &["observe_refresh", "healing_memory", "authoring_patch", "checkpoint"],
        ExtractionEmpty => &["retry", "observe_refresh", "checkpoint"],
        Navigation => &["retry", "checkpoint"],
        CaptchaOr2FA => &["checkpoint"],
        AuthoringServiceTimeout => &["healing_memory", "checkpoint"],
        CanvasDetected => &["checkpoint"],
        // Not in the §4.5 router table; falls back to the same terminal
        // escalation as CaptchaOr2FA/CanvasDetected rather than guessing at
        // a strategy for an unclassified failure.
        Unknown => &["checkpoint"],
    };

    methods.iter().map(|m| action_for(m)).collect()
}

fn action_for(method: &str) -> Box<dyn RecoveryAction> {
    match method {
        "retry" => Box::new(retry::Retry),
        "selector_fallback" => Box::new(selector_fallback::SelectorFallback),
        "observe_refresh" => Box::new(observe_refresh::ObserveRefresh),
        "healing_memory" => Box::new(healing_memory::HealingMemoryLookup),
        "authoring_patch" => Box::new(authoring_patch::AuthoringPatch),
        "checkpoint" => Box::new(checkpoint::CheckpointEscalation),
        other => unreachable!("unknown recovery method {other}"),
    }
}

/// Runs the ordered plan for `ctx.error_type`, stopping at the first action
/// that recovers, or after `checkpoint` regardless of its outcome (checkpoint
/// is always terminal, §4.5). An action that errors internally is treated as
/// "not recovered" and the pipeline moves on (§4.5/§7).
pub async fn run(ctx: &FailureContext, deps: &RecoveryDeps<'_>) -> RecoveryOutcome {
    let plan = build_plan(ctx.error_type);

    for action in plan {
        let method = action.method_name();
        deps.metrics.record_ladder_attempt(method);
        let outcome = action.attempt(ctx, deps).await;

        if outcome.recovered {
            return outcome;
        }
        if method == "checkpoint" {
            return outcome;
        }
    }

    RecoveryOutcome::not_recovered("exhausted")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::simulated::{PageFixture, SimulatedEngine};
    use crate::checkpoint::AutoApproveCheckpoint;
    use crate::healing::HealingMemory;
    use crate::metrics::MetricsCollector;
    use crate::recipe::{ActionMethod, RecipeVersion, SelectorEntry, SelectorStrategy, Step, Op, Workflow};
    use std::collections::HashMap;
    use uuid::Uuid;

    fn blank_recipe() -> Recipe {
        Recipe {
            domain: "example.com".into(),
            flow: "login".into(),
            version: RecipeVersion::initial(),
            workflow: Workflow {
                id: "wf".into(),
                version: None,
                vars: serde_json::Value::Null,
                steps: vec![Step {
                    id: "open".into(),
                    op: Op::Goto,
                    target_key: None,
                    args: serde_json::Value::Null,
                    expect: vec![],
                    on_fail: None,
                }],
            },
            actions: HashMap::new(),
            selectors: HashMap::new(),
            fingerprints: vec![],
            policies: HashMap::new(),
        }
    }

    fn action(selector: &str) -> ActionRef {
        ActionRef {
            selector: selector.to_string(),
            description: "click it".into(),
            method: ActionMethod::Click,
            arguments: None,
        }
    }

    #[tokio::test]
    async fn retry_recovers_when_selector_reappears() {
        let engine = SimulatedEngine::new("https://example.com")
            .with_page("https://example.com", PageFixture::new("Home").with_selector("#ok"))
            .await;
        let healing_memory = HealingMemory::open(temp_dir::TempDir::new().unwrap().path().join("h.json"))
            .await
            .unwrap();
        let metrics = MetricsCollector::new(Uuid::new_v4(), "login", "v001");
        let budget = BudgetGuard::new(crate::budget::TokenBudget::default());
        let recipe = blank_recipe();

        let deps = RecoveryDeps {
            engine: &engine,
            healing_memory: &healing_memory,
            patch_planner: None,
            checkpoint: &AutoApproveCheckpoint,
            metrics: &metrics,
            budget: &budget,
            recipe: &recipe,
        };

        let ctx = FailureContext {
            step_id: "click".into(),
            error_type: ErrorType::TargetNotFound,
            url: "https://example.com".into(),
            title: None,
            failed_selector: Some("#ok".into()),
            failed_action: Some(action("#ok")),
            target_key: None,
        };

        let outcome = run(&ctx, &deps).await;
        assert!(outcome.recovered);
        assert_eq!(outcome.method, "retry");
    }

    #[tokio::test]
    async fn selector_fallback_recovers_via_fallback_candidate() {
        let engine = SimulatedEngine::new("https://example.com")
            .with_page(
                "https://example.com",
                PageFixture::new("Home").with_selector("a[href='x']"),
            )
            .await;
        let healing_memory = HealingMemory::open(temp_dir::TempDir::new().unwrap().path().join("h.json"))
            .await
            .unwrap();
        let metrics = MetricsCollector::new(Uuid::new_v4(), "login", "v001");
        let budget = BudgetGuard::new(crate::budget::TokenBudget::default());
        let mut recipe = blank_recipe();
        recipe.selectors.insert(
            "lnk".into(),
            SelectorEntry {
                primary: "#missing".into(),
                fallbacks: vec!["a[href='x']".into()],
                strategy: SelectorStrategy::Css,
            },
        );

        let deps = RecoveryDeps {
            engine: &engine,
            healing_memory: &healing_memory,
            patch_planner: None,
            checkpoint: &AutoApproveCheckpoint,
            metrics: &metrics,
            budget: &budget,
            recipe: &recipe,
        };

        let ctx = FailureContext {
            step_id: "click".into(),
            error_type: ErrorType::TargetNotFound,
            url: "https://example.com".into(),
            title: None,
            failed_selector: Some("#missing".into()),
            failed_action: Some(action("#missing")),
            target_key: Some("lnk".into()),
        };

        let outcome = run(&ctx, &deps).await;
        assert!(outcome.recovered);
        assert_eq!(outcome.method, "selector_fallback");
    }

    #[tokio::test]
    async fn captcha_goes_straight_to_checkpoint_and_recovers_on_go() {
        let engine = SimulatedEngine::new("https://example.com")
            .with_page("https://example.com", PageFixture::new("Home"))
            .await;
        let healing_memory = HealingMemory::open(temp_dir::TempDir::new().unwrap().path().join("h.json"))
            .await
            .unwrap();
        let metrics = MetricsCollector::new(Uuid::new_v4(), "login", "v001");
        let budget = BudgetGuard::new(crate::budget::TokenBudget::default());
        let recipe = blank_recipe();

        let deps = RecoveryDeps {
            engine: &engine,
            healing_memory: &healing_memory,
            patch_planner: None,
            checkpoint: &AutoApproveCheckpoint,
            metrics: &metrics,
            budget: &budget,
            recipe: &recipe,
        };

        let ctx = FailureContext {
            step_id: "login".into(),
            error_type: ErrorType::CaptchaOr2FA,
            url: "https://example.com".into(),
            title: None,
            failed_selector: None,
            failed_action: None,
            target_key: None,
        };

        let outcome = run(&ctx, &deps).await;
        assert!(outcome.recovered);
        assert_eq!(outcome.method, "checkpoint");
    }
}
