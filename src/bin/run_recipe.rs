//! `run-recipe` — reads `{recipe, options?}` as JSON from stdin, drives one
//! workflow run, and streams `RunEvent` JSON objects to stdout, one per
//! line (§4.7/§6). Exit code 0 iff a `run_complete{ok:true}` was emitted.

use recipe_runtime::prelude::*;
use serde::Deserialize;
use std::io::Read;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Deserialize)]
struct RunOptions {
    #[serde(default)]
    headless: Option<bool>,
    #[serde(default)]
    timeout: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RunRequest {
    recipe: Recipe,
    #[serde(default)]
    options: Option<RunOptions>,
}

#[derive(Debug, serde::Serialize)]
struct TraceMeta {
    flow: String,
    version: String,
    run_id: uuid::Uuid,
    llm_calls: u32,
    patches_applied: usize,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    match run().await {
        Ok(true) => std::process::ExitCode::SUCCESS,
        Ok(false) => std::process::ExitCode::FAILURE,
        Err(e) => {
            let event = RunEvent::RunError { error: e.to_string() };
            println!("{}", serde_json::to_string(&event).unwrap_or_default());
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<bool> {
    let mut raw = String::new();
    std::io::stdin().read_to_string(&mut raw)?;
    let request: RunRequest = serde_json::from_str(&raw)?;

    let config_path = std::env::var("RECIPE_RUNTIME_CONFIG").unwrap_or_else(|_| "recipe-runtime.toml".to_string());
    let mut config = RuntimeConfig::load(&config_path).await?;
    if let Some(options) = &request.options {
        if let Some(headless) = options.headless {
            config.browser.headless = headless;
        }
    }

    let healing_memory = HealingMemory::open(&config.healing_memory_path).await?;

    let run_ctx = RunContext::new(request.recipe, config.token_budget.clone());
    let run_dir = config.run_dir_root.join(run_ctx.run_id.to_string());
    tokio::fs::create_dir_all(&run_dir).await?;

    let metrics = MetricsCollector::new(run_ctx.run_id, run_ctx.recipe.flow.clone(), run_ctx.recipe.version.to_string());
    let events = EventStream::new();
    let mut subscriber = events.subscribe();

    let printer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        loop {
            let event = match subscriber.recv().await {
                Ok(event) => event,
                Err(_) => break,
            };
            let is_terminal = matches!(event, RunEvent::RunComplete { .. } | RunEvent::RunError { .. });
            let line = serde_json::to_string(&event).unwrap_or_default();
            let _ = stdout.write_all(line.as_bytes()).await;
            let _ = stdout.write_all(b"\n").await;
            if is_terminal {
                break;
            }
        }
        let _ = stdout.flush().await;
    });

    #[cfg(feature = "webdriver")]
    let engine = recipe_runtime::browser::webdriver::WebDriverEngine::connect(
        &config.browser.webdriver_url,
        config.browser.headless,
    )
    .await?;
    #[cfg(not(feature = "webdriver"))]
    let engine = simulated_engine_from_recipe(&run_ctx.recipe).await;

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
        max_retries: config.max_retries,
        persist_dir: Some(run_dir.as_path()),
    };

    let timeout_ms = request.options.as_ref().and_then(|o| o.timeout).unwrap_or(120_000);
    let summary = match tokio::time::timeout(Duration::from_millis(timeout_ms), runner.run(&run_ctx)).await {
        Ok(summary) => summary,
        Err(_) => {
            events.publish(RunEvent::RunError { error: "run timed out".to_string() });
            let _ = printer.await;
            return Ok(false);
        }
    };

    let _ = printer.await;

    let usage = run_ctx.usage();
    let patches_applied = summary.pending_patches.len();
    let trace_meta = TraceMeta {
        flow: run_ctx.recipe.flow.clone(),
        version: run_ctx.recipe.version.to_string(),
        run_id: run_ctx.run_id,
        llm_calls: usage.llm_calls,
        patches_applied,
    };
    tokio::fs::write(run_dir.join("trace-meta.json"), serde_json::to_vec_pretty(&trace_meta)?).await?;

    metrics.finalize(summary.ok, &run_dir).await?;

    Ok(summary.ok)
}

#[cfg(not(feature = "webdriver"))]
async fn simulated_engine_from_recipe(recipe: &Recipe) -> recipe_runtime::browser::SimulatedEngine {
    use recipe_runtime::browser::simulated::PageFixture;

    let start_url = recipe
        .fingerprints
        .first()
        .and_then(|f| f.url_contains.clone())
        .unwrap_or_else(|| format!("https://{}", recipe.domain));

    let mut fixture = PageFixture::new(recipe.flow.clone());
    for action in recipe.actions.values() {
        fixture = fixture.with_selector(action.preferred.selector.clone());
    }
    for selector in recipe.selectors.values() {
        fixture = fixture.with_selector(selector.primary.clone());
        for fallback in &selector.fallbacks {
            fixture = fixture.with_selector(fallback.clone());
        }
    }
    fixture = fixture.with_text("body", "simulated run, no real browser configured");

    recipe_runtime::browser::SimulatedEngine::new(start_url.clone())
        .with_page(start_url, fixture)
        .await
}

