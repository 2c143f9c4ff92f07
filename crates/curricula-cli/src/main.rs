//! Curricula - curriculum DAG quality optimizer CLI
//!
//! The `curricula` command runs the deterministic judge and repair loop over
//! curriculum drafts stored as JSON.
//!
//! ## Commands
//!
//! - `analyze`: Print the graph view of a draft
//! - `judge`: Score a draft, optionally with a recorded critique
//! - `optimize`: Run the repair loop with the built-in collaborators
//! - `inspect-trace`: Verify and print a recorded run
//! - `prune`: Delete run directories by outcome, age and count

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use curricula_core::collaborators::heuristic::ExecutorConfig;
use curricula_core::{
    analyze, read_curriculum_artifact, read_trace_artifact, write_curriculum_artifact,
    write_trace_artifact, CancellationFlag, Critique, CurriculumDraft, DeterministicQualityJudge,
    DeterministicRepairExecutor, HeuristicCritic, LoopController, OptimizationResult,
    OptimizerConfig, ProposalRequest, Resource, RetentionPolicy, StaticProposer, TopicSpec,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

const DEFAULT_RUNS_DIR: &str = ".curricula/runs";

#[derive(Parser)]
#[command(name = "curricula")]
#[command(author = "Curricula Maintainers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Deterministic quality optimizer for curriculum DAGs", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Optimizer configuration file (TOML)
    #[arg(short, long, global = true, env = "CURRICULA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print topological order, layers, critical path and cycles of a draft
    Analyze {
        /// Draft JSON file
        draft: PathBuf,
    },

    /// Score a draft against the quality rubric
    Judge {
        /// Draft JSON file
        draft: PathBuf,

        /// Critique JSON file to fold into the learner dimension
        #[arg(long, conflicts_with = "heuristic_critic")]
        critique: Option<PathBuf>,

        /// Run the built-in novice critic instead of reading a critique
        #[arg(long)]
        heuristic_critic: bool,
    },

    /// Run the judge and repair loop until acceptance, stall or budget
    Optimize {
        /// Initial draft JSON file
        draft: PathBuf,

        /// Topic JSON file (defaults to the draft's topic with no overrides)
        #[arg(long)]
        topic: Option<PathBuf>,

        /// Directory for run artifacts
        #[arg(long, default_value = DEFAULT_RUNS_DIR)]
        out: PathBuf,

        /// Write the returned curriculum here as well
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// JSON array of resources the repair executor may attach to nodes
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Verify and print a recorded run
    InspectTrace {
        /// Run id
        run: String,

        /// Directory holding run artifacts
        #[arg(long, default_value = DEFAULT_RUNS_DIR)]
        dir: PathBuf,

        /// Also print the stored curriculum
        #[arg(long)]
        curriculum: bool,
    },

    /// Delete run directories outside the retention policy
    Prune {
        /// Directory holding run artifacts
        #[arg(long, default_value = DEFAULT_RUNS_DIR)]
        dir: PathBuf,

        /// Remove runs older than this many days
        #[arg(long)]
        max_age_days: Option<u64>,

        /// Keep at most this many runs
        #[arg(long)]
        max_runs: Option<usize>,

        /// Never prune runs that ended with an accepted curriculum
        #[arg(long)]
        keep_accepted: bool,

        /// Prune every run that aborted with an error
        #[arg(long)]
        drop_aborted: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    curricula_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Analyze { draft } => cmd_analyze(&draft),
        Commands::Judge {
            draft,
            critique,
            heuristic_critic,
        } => {
            let config = load_config(cli.config.as_deref())?;
            cmd_judge(&config, &draft, critique.as_deref(), heuristic_critic)
        }
        Commands::Optimize {
            draft,
            topic,
            out,
            output,
            catalog,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let catalog = match catalog {
                Some(path) => load_catalog(&path)?,
                None => Vec::new(),
            };
            cmd_optimize(config, &draft, topic.as_deref(), catalog, &out, output.as_deref()).await
        }
        Commands::InspectTrace {
            run,
            dir,
            curriculum,
        } => cmd_inspect_trace(&run, &dir, curriculum),
        Commands::Prune {
            dir,
            max_age_days,
            max_runs,
            keep_accepted,
            drop_aborted,
        } => cmd_prune(
            &dir,
            RetentionPolicy {
                max_age_days,
                max_runs,
                keep_accepted,
                drop_aborted,
            },
        ),
    }
}

/// Load the optimizer configuration: defaults, then the file, then env.
fn load_config(path: Option<&Path>) -> Result<OptimizerConfig> {
    match path {
        Some(path) => OptimizerConfig::load(path)
            .with_context(|| format!("Failed to load config from {:?}", path)),
        None => {
            let mut config = OptimizerConfig::default();
            config
                .apply_env_overrides()
                .context("Invalid CURRICULA_* environment override")?;
            config.validate().context("Invalid configuration")?;
            Ok(config)
        }
    }
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_slice(&bytes).with_context(|| format!("{:?} is not valid JSON", path))
}

fn load_draft(path: &Path) -> Result<CurriculumDraft> {
    CurriculumDraft::from_response("input", read_json(path)?)
        .with_context(|| format!("Draft {:?} failed validation", path))
}

fn load_catalog(path: &Path) -> Result<Vec<Resource>> {
    serde_json::from_value(read_json(path)?)
        .with_context(|| format!("Catalog {:?} is not a list of resources", path))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_analyze(path: &Path) -> Result<()> {
    let draft = load_draft(path)?;
    let view = analyze(&draft);

    if view.cycles.cycles_detected {
        warn!(unvisited = ?view.cycles.unvisited, "draft contains a prerequisite cycle");
    }
    print_json(&view)
}

fn cmd_judge(
    config: &OptimizerConfig,
    path: &Path,
    critique: Option<&Path>,
    heuristic_critic: bool,
) -> Result<()> {
    let draft = load_draft(path)?;
    let critique = match critique {
        Some(p) => Some(
            Critique::from_response("critic", read_json(p)?)
                .with_context(|| format!("Critique {:?} failed validation", p))?,
        ),
        None if heuristic_critic => Some(HeuristicCritic::new(config.critic.clone()).review(&draft)),
        None => None,
    };

    let judge = DeterministicQualityJudge::new(config.judge.clone());
    let report = judge.evaluate(&draft, &analyze(&draft), critique.as_ref());
    info!(
        aggregate = report.aggregate,
        hard_gates = report.hard_gate_count,
        accepted = report.accepted,
        "draft judged"
    );
    print_json(&report)
}

/// Printed after an optimize run.
#[derive(Debug, Serialize)]
struct RunOutcome {
    run_id: String,
    stop_reason: String,
    accepted: bool,
    judging_passes: usize,
    best_aggregate: Option<u32>,
    trace_path: PathBuf,
    curriculum_path: Option<PathBuf>,
}

async fn cmd_optimize(
    config: OptimizerConfig,
    draft_path: &Path,
    topic_path: Option<&Path>,
    catalog: Vec<Resource>,
    out: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let draft = load_draft(draft_path)?;
    let topic: TopicSpec = match topic_path {
        Some(p) => serde_json::from_value(read_json(p)?)
            .with_context(|| format!("Topic {:?} is not a valid topic spec", p))?,
        None => TopicSpec::new(draft.topic.clone()),
    };

    if !catalog.is_empty() {
        info!(resources = catalog.len(), "loaded resource catalog");
    }
    let executor = DeterministicRepairExecutor::new(ExecutorConfig::from_judge(
        &config.judge_for(&topic),
    ))
    .with_catalog(catalog);
    let controller = LoopController::new(
        Arc::new(StaticProposer::new(draft)),
        Arc::new(HeuristicCritic::new(config.critic.clone())),
        Arc::new(executor),
        config,
    )
    .context("Failed to build loop controller")?;

    let cancel = CancellationFlag::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let request = ProposalRequest {
        topic,
        context_snippets: Vec::new(),
    };
    let result = match controller.optimize(request, &cancel).await {
        Ok(result) => result,
        Err(aborted) => {
            let path = write_trace_artifact(&aborted.trace, out)
                .context("Failed to write trace of aborted run")?;
            eprintln!("Trace written to {:?}", path);
            return Err(anyhow::Error::new(aborted));
        }
    };

    let outcome = persist_run(&result, out, output)?;
    print_json(&outcome)?;

    if !result.accepted() {
        warn!(stop_reason = %result.stop_reason(), "run ended without an accepted curriculum");
    }
    Ok(())
}

fn persist_run(result: &OptimizationResult, out: &Path, output: Option<&Path>) -> Result<RunOutcome> {
    let trace = &result.trace;
    let trace_path = write_trace_artifact(trace, out)
        .with_context(|| format!("Failed to write trace under {:?}", out))?;

    let curriculum_path = match result.draft() {
        Some(draft) => {
            let path = write_curriculum_artifact(&trace.run_id, draft, out)
                .with_context(|| format!("Failed to write curriculum under {:?}", out))?;
            if let Some(dest) = output {
                std::fs::write(dest, serde_json::to_vec_pretty(draft)?)
                    .with_context(|| format!("Failed to write curriculum to {:?}", dest))?;
            }
            Some(path)
        }
        None => None,
    };

    Ok(RunOutcome {
        run_id: trace.run_id.clone(),
        stop_reason: trace.stop_reason.to_string(),
        accepted: trace.accepted,
        judging_passes: trace.judging_passes(),
        best_aggregate: trace.best.as_ref().map(|b| b.aggregate),
        trace_path,
        curriculum_path,
    })
}

fn cmd_inspect_trace(run_id: &str, dir: &Path, curriculum: bool) -> Result<()> {
    let trace = read_trace_artifact(run_id, dir)
        .with_context(|| format!("Failed to verify trace for run {}", run_id))?;

    println!("run {}", trace.run_id);
    println!("Topic:   {}", trace.topic);
    println!("Started: {}", trace.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Stop:    {}", trace.stop_reason);
    println!();
    for record in &trace.iterations {
        println!(
            "  #{} aggregate={} hard_gates={} diagnostics={} applied={} dropped={} cooled={}",
            record.iteration,
            record.report.aggregate,
            record.report.hard_gate_count,
            record.report.diagnostic_count,
            record.actions_applied.len(),
            record.actions_dropped.len(),
            record.cooldown_suppressed.len(),
        );
    }
    if let Some(best) = &trace.best {
        println!();
        println!("Best: pass {} ({})", best.iteration, best.aggregate);
    }

    if curriculum {
        let draft = read_curriculum_artifact(run_id, dir)
            .with_context(|| format!("Failed to verify curriculum for run {}", run_id))?;
        println!();
        print_json(&draft)?;
    }
    Ok(())
}

fn cmd_prune(dir: &Path, policy: RetentionPolicy) -> Result<()> {
    if policy.max_age_days.is_none() && policy.max_runs.is_none() && !policy.drop_aborted {
        anyhow::bail!("Nothing to prune: pass --max-age-days, --max-runs or --drop-aborted");
    }
    let pruned = policy
        .prune(dir)
        .with_context(|| format!("Failed to prune {:?}", dir))?;
    for run_id in &pruned {
        println!("pruned {}", run_id);
    }
    println!("Pruned {} run(s) from {:?}", pruned.len(), dir);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use curricula_core::Node;

    fn write_draft(dir: &Path) -> PathBuf {
        let draft = CurriculumDraft::new(
            "Learn caching",
            vec![
                Node::new("N1", "Cache basics", "Explain cache hits and misses")
                    .with_estimate(30.0)
                    .with_mastery("Label ten requests as hit or miss", "At least nine correct"),
            ],
        );
        let path = dir.join("draft.json");
        std::fs::write(&path, serde_json::to_vec(&draft).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_load_draft_rejects_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"topic": "t", "nodes": [], "extra": 1}"#).unwrap();
        assert!(load_draft(&path).is_err());
    }

    #[tokio::test]
    async fn test_optimize_persists_verifiable_run() {
        let dir = tempfile::tempdir().unwrap();
        let draft_path = write_draft(dir.path());
        let out = dir.path().join("runs");
        let copy = dir.path().join("final.json");

        cmd_optimize(OptimizerConfig::default(), &draft_path, None, Vec::new(), &out, Some(&copy))
            .await
            .unwrap();

        let run_id = std::fs::read_dir(&out)
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .file_name()
            .to_string_lossy()
            .to_string();
        let trace = read_trace_artifact(&run_id, &out).unwrap();
        assert!(trace.judging_passes() >= 1);
        assert!(copy.exists());
        cmd_inspect_trace(&run_id, &out, true).unwrap();
    }

    #[test]
    fn test_load_catalog_reads_resource_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"[{"title": "LRU guide", "url": "https://example.com/lru", "kind": "doc"}]"#,
        )
        .unwrap();
        let catalog = load_catalog(&path).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].url, "https://example.com/lru");

        std::fs::write(&path, r#"{"title": "not a list"}"#).unwrap();
        assert!(load_catalog(&path).is_err());
    }

    #[test]
    fn test_prune_requires_a_limit() {
        let dir = tempfile::tempdir().unwrap();
        assert!(cmd_prune(dir.path(), RetentionPolicy::default()).is_err());
        let keep_five = RetentionPolicy {
            max_runs: Some(5),
            keep_accepted: true,
            ..Default::default()
        };
        cmd_prune(dir.path(), keep_five).unwrap();
    }
}
