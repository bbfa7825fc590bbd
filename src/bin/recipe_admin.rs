//! `recipe-admin` — operator subcommands for recipe import/export and
//! Healing Memory maintenance, grounded on the `clap`-derive CLI shape the
//! retrieval pack's sibling crates use (§6 CLI surface, expanded).

use clap::{Parser, Subcommand};
use recipe_runtime::config::RuntimeConfig;
use recipe_runtime::healing::HealingMemory;
use recipe_runtime::metrics::{Aggregator, RunMetrics};
use recipe_runtime::recipe::RecipeVersion;
use recipe_runtime::storage;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "recipe-admin", about = "Operator CLI for the recipe runtime", version)]
struct Cli {
    #[arg(long, global = true, default_value = "recipe-runtime.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import a recipe directory or ZIP archive under the recipes root.
    Import {
        path: PathBuf,
        #[arg(long = "domain")]
        domain: String,
        #[arg(long = "flow")]
        flow: String,
        #[arg(long = "version")]
        version: RecipeVersion,
        #[arg(long = "into")]
        into: Option<PathBuf>,
    },
    /// Export a stored recipe as a ZIP archive.
    Export {
        domain: String,
        flow: String,
        version: RecipeVersion,
        #[arg(long = "out")]
        out: PathBuf,
    },
    /// Prune stale/low-confidence healing memory entries.
    PruneHealing {
        #[arg(long = "min-confidence")]
        min_confidence: Option<f64>,
        #[arg(long = "max-age-days")]
        max_age_days: Option<i64>,
    },
    /// Print Healing Memory summary statistics.
    StatsHealing,
    /// Aggregate `RunMetrics` snapshots found under a directory glob and
    /// print the rollup, including SLO compliance.
    Aggregate {
        logs_glob: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let cli = Cli::parse();
    let config = RuntimeConfig::load(&cli.config).await?;

    match cli.command {
        Command::Import {
            path,
            domain,
            flow,
            version,
            into,
        } => import(&path, &domain, &flow, version, into.unwrap_or(config.recipes_root)).await,
        Command::Export { domain, flow, version, out } => {
            export(&config.recipes_root, &domain, &flow, version, &out).await
        }
        Command::PruneHealing {
            min_confidence,
            max_age_days,
        } => prune_healing(&config.healing_memory_path, min_confidence, max_age_days).await,
        Command::StatsHealing => stats_healing(&config.healing_memory_path).await,
        Command::Aggregate { logs_glob } => aggregate(&logs_glob).await,
    }
}

async fn import(path: &std::path::Path, domain: &str, flow: &str, version: RecipeVersion, recipes_root: PathBuf) -> anyhow::Result<()> {
    let is_zip = path.extension().map(|e| e.eq_ignore_ascii_case("zip")).unwrap_or(false);

    let recipe = if is_zip {
        let bytes = tokio::fs::read(path).await?;
        storage::archive::import(&bytes, domain, flow, version)?
    } else {
        storage::load(path, domain, flow, version).await?
    };

    let problems = recipe.validate();
    if !problems.is_empty() {
        anyhow::bail!("recipe failed validation:\n{}", problems.join("\n"));
    }

    storage::save(&recipes_root, &recipe).await?;
    println!(
        "imported {}/{}@{} into {}",
        domain,
        flow,
        version,
        storage::recipe_dir(&recipes_root, domain, flow, version).display()
    );
    Ok(())
}

async fn export(recipes_root: &std::path::Path, domain: &str, flow: &str, version: RecipeVersion, out: &std::path::Path) -> anyhow::Result<()> {
    let recipe = storage::load(recipes_root, domain, flow, version).await?;
    let bytes = storage::archive::export(&recipe)?;
    tokio::fs::write(out, bytes).await?;
    println!("exported {}/{}@{} to {}", domain, flow, version, out.display());
    Ok(())
}

async fn prune_healing(path: &std::path::Path, min_confidence: Option<f64>, max_age_days: Option<i64>) -> anyhow::Result<()> {
    let memory = HealingMemory::open(path).await?;
    let pruned = memory.prune(min_confidence, max_age_days).await?;
    println!("pruned {pruned} healing memory entries");
    Ok(())
}

async fn stats_healing(path: &std::path::Path) -> anyhow::Result<()> {
    let memory = HealingMemory::open(path).await?;
    let stats = memory.get_stats().await;
    println!("total records:     {}", stats.total_records);
    println!("average confidence: {:.3}", stats.avg_confidence);
    println!("hit rate:           {:.3}", stats.hit_rate);
    println!("by domain:");
    for (domain, count) in &stats.domain_distribution {
        println!("  {domain}: {count}");
    }
    Ok(())
}

async fn aggregate(logs_glob: &str) -> anyhow::Result<()> {
    let mut runs = Vec::new();
    for entry in glob::glob(logs_glob)? {
        let path = entry?;
        let raw = tokio::fs::read_to_string(&path).await?;
        match serde_json::from_str::<RunMetrics>(&raw) {
            Ok(metrics) => runs.push(metrics),
            Err(e) => eprintln!("skipping {}: {e}", path.display()),
        }
    }

    if runs.is_empty() {
        println!("no run metrics matched {logs_glob}");
        return Ok(());
    }

    let report = Aggregator::aggregate(&runs);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
