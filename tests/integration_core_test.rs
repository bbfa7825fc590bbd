//! End-to-end integration tests exercising a full run through the
//! Workflow Runner, Step Executor and Recovery Pipeline against the
//! in-memory `SimulatedEngine`, plus the Patch Workflow and recipe
//! storage round-tripping through the filesystem.

use recipe_runtime::browser::simulated::{PageFixture, SimulatedEngine};
use recipe_runtime::budget::TokenBudget;
use recipe_runtime::checkpoint::AutoApproveCheckpoint;
use recipe_runtime::context::RunContext;
use recipe_runtime::events::{EventStream, RunEvent};
use recipe_runtime::executor::StepExecutor;
use recipe_runtime::healing::HealingMemory;
use recipe_runtime::metrics::MetricsCollector;
use recipe_runtime::patch::{self, PatchOp, PatchPayload};
use recipe_runtime::recipe::{
    ActionEntry, ActionMethod, ActionRef, ExpectationKind, Op, OnFail, Recipe, RecipeVersion,
    SelectorEntry, SelectorStrategy, Step, Workflow,
};
use recipe_runtime::runner::WorkflowRunner;
use recipe_runtime::storage;
use std::collections::HashMap;
use uuid::Uuid;

fn login_recipe() -> Recipe {
    let mut actions = HashMap::new();
    actions.insert(
        "login_button".to_string(),
        ActionEntry {
            instruction: "click the login button".to_string(),
            preferred: ActionRef {
                selector: "#login".to_string(),
                description: "login button".to_string(),
                method: ActionMethod::Click,
                arguments: None,
            },
            observed_at: chrono::Utc::now(),
        },
    );

    Recipe {
        domain: "example.com".to_string(),
        flow: "login".to_string(),
        version: RecipeVersion::initial(),
        workflow: Workflow {
            id: "login_flow".to_string(),
            version: None,
            vars: serde_json::Value::Null,
            steps: vec![
                Step {
                    id: "open".to_string(),
                    op: Op::Goto,
                    target_key: None,
                    args: serde_json::json!({"url": "https://example.com/login"}),
                    expect: vec![recipe_runtime::recipe::Expectation {
                        kind: ExpectationKind::TitleContains,
                        value: "Login".to_string(),
                    }],
                    on_fail: Some(OnFail::Abort),
                },
                Step {
                    id: "click_login".to_string(),
                    op: Op::ActCached,
                    target_key: Some("login_button".to_string()),
                    args: serde_json::Value::Null,
                    expect: vec![],
                    on_fail: Some(OnFail::Checkpoint),
                },
            ],
        },
        actions,
        selectors: HashMap::new(),
        fingerprints: vec![],
        policies: HashMap::new(),
    }
}

async fn fixtures() -> (SimulatedEngine, HealingMemory) {
    let engine = SimulatedEngine::new("https://example.com")
        .with_page(
            "https://example.com/login",
            PageFixture::new("Login - Example").with_selector("#login"),
        )
        .await;
    let healing_memory = HealingMemory::open(temp_dir::TempDir::new().unwrap().path().join("healing.json"))
        .await
        .unwrap();
    (engine, healing_memory)
}

#[tokio::test]
async fn happy_path_run_completes_successfully_and_emits_well_formed_event_stream() {
    let (engine, healing_memory) = fixtures().await;
    let run_ctx = RunContext::new(login_recipe(), TokenBudget::default());
    let metrics = MetricsCollector::new(run_ctx.run_id, "login", "v001");
    let events = EventStream::new();
    let mut subscriber = events.subscribe();

    let checkpoint = AutoApproveCheckpoint;
    let executor = StepExecutor {
        engine: &engine,
        healing_memory: &healing_memory,
        patch_planner: None,
        checkpoint: &checkpoint,
        metrics: &metrics,
    };
    let runner = WorkflowRunner {
        executor,
        checkpoint: &checkpoint,
        events: &events,
        max_retries: 1,
        persist_dir: None,
    };

    let summary = runner.run(&run_ctx).await;
    assert!(summary.ok);
    assert_eq!(summary.step_results.len(), 2);
    assert!(summary.step_results.iter().all(|r| r.ok));

    let mut saw_start = 0;
    let mut step_starts = Vec::new();
    let mut step_ends = Vec::new();
    let mut saw_terminator = 0;
    while let Ok(event) = subscriber.try_recv() {
        match event {
            RunEvent::RunStart { .. } => saw_start += 1,
            RunEvent::StepStart { step_id, .. } => step_starts.push(step_id),
            RunEvent::StepEnd { step_id, .. } => step_ends.push(step_id),
            RunEvent::RunComplete { .. } | RunEvent::RunError { .. } => saw_terminator += 1,
        }
    }

    assert_eq!(saw_start, 1, "exactly one run_start");
    assert_eq!(saw_terminator, 1, "exactly one terminator");
    assert_eq!(step_starts, step_ends, "step_start/step_end pairs match in order");
}

#[tokio::test]
async fn target_not_found_recovers_via_selector_fallback_and_run_still_succeeds() {
    let (engine, healing_memory) = fixtures().await;
    let mut recipe = login_recipe();
    // Drift the cached selector so the preferred action misses, forcing
    // the ladder to fall through to the selector-fallback candidate.
    recipe.actions.get_mut("login_button").unwrap().preferred.selector = "#stale-login".to_string();
    recipe.selectors.insert(
        "login_button".to_string(),
        SelectorEntry {
            primary: "#stale-login".to_string(),
            fallbacks: vec!["#login".to_string()],
            strategy: SelectorStrategy::Css,
        },
    );

    let run_ctx = RunContext::new(recipe, TokenBudget::default());
    let metrics = MetricsCollector::new(run_ctx.run_id, "login", "v001");
    let events = EventStream::new();

    let checkpoint = AutoApproveCheckpoint;
    let executor = StepExecutor {
        engine: &engine,
        healing_memory: &healing_memory,
        patch_planner: None,
        checkpoint: &checkpoint,
        metrics: &metrics,
    };
    let runner = WorkflowRunner {
        executor,
        checkpoint: &checkpoint,
        events: &events,
        max_retries: 1,
        persist_dir: None,
    };

    let summary = runner.run(&run_ctx).await;
    assert!(summary.ok);
    let click_step = summary.step_results.iter().find(|r| r.step_id == "click_login").unwrap();
    assert!(click_step.message.as_deref().unwrap_or("").contains("selector_fallback"));
}

#[tokio::test]
async fn patch_workflow_round_trips_through_recipe_storage() {
    let dir = temp_dir::TempDir::new().unwrap();
    let recipe = login_recipe();
    storage::save(dir.path(), &recipe).await.unwrap();

    let payload = PatchPayload {
        patch: vec![PatchOp::ActionsReplace {
            key: "login_button".to_string(),
            value: ActionEntry {
                instruction: "click the new login button".to_string(),
                preferred: ActionRef {
                    selector: "#new-login".to_string(),
                    description: "login button".to_string(),
                    method: ActionMethod::Click,
                    arguments: None,
                },
                observed_at: chrono::Utc::now(),
            },
        }],
        reason: "selector drifted after a page redesign".to_string(),
    };

    let patched = patch::apply(&recipe, &payload).unwrap();
    assert_eq!(patched.version, RecipeVersion(2));
    storage::save(dir.path(), &patched).await.unwrap();

    let reloaded = storage::load(dir.path(), "example.com", "login", RecipeVersion(2)).await.unwrap();
    assert_eq!(reloaded.actions["login_button"].preferred.selector, "#new-login");

    let original = storage::load(dir.path(), "example.com", "login", RecipeVersion::initial()).await.unwrap();
    assert_eq!(original.actions["login_button"].preferred.selector, "#login");
}

#[tokio::test]
async fn metrics_finalize_writes_artifacts_aggregate_sees_them() {
    let dir = temp_dir::TempDir::new().unwrap();
    let run_id = Uuid::new_v4();
    let metrics = MetricsCollector::new(run_id, "login", "v001");
    metrics.record_step(
        recipe_runtime::context::StepResult::ok("open".to_string(), 5),
        None,
    );

    let run_metrics = metrics.finalize(true, dir.path()).await.unwrap();
    assert!(dir.path().join("logs.jsonl").exists());
    assert!(dir.path().join("summary.md").exists());

    let report = recipe_runtime::metrics::Aggregator::aggregate(&[run_metrics]);
    assert_eq!(report.success_rate, 1.0);
}
