//! Pose Coach
//!
//! Replays recorded landmark streams through a rule graph and reports what a
//! live coaching session would have shown.
//!
//! This is the entry point for the standalone binary. For library use, see lib.rs.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use pose_coach::cli::{Cli, Commands};
use pose_coach::{
    EngineConfig, FitMethod, FuzzySimulation, GraphSpec, Sample, SessionPipeline, Simulate,
    Simulation,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Parse CLI arguments first so we can use --verbose to set log level
    let cli = Cli::parse_args();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Replay {
            samples,
            rules,
            fuzzy,
            raw,
            log,
        } => {
            run_replay(&samples, &rules, config, fuzzy, raw, log.as_deref())?;
        }
        Commands::CheckRules { rules } => {
            run_check_rules(&rules)?;
        }
    }

    Ok(())
}

fn run_replay(
    samples: &Path,
    rules: &Path,
    mut config: EngineConfig,
    fuzzy: bool,
    raw: bool,
    log: Option<&Path>,
) -> anyhow::Result<()> {
    let spec = GraphSpec::load(rules).with_context(|| format!("loading rules {}", rules.display()))?;
    let (graph, start) = spec.build()?;
    let graph = Arc::new(graph);

    if config.summary.landmarks.is_empty() {
        config.summary.landmarks = spec.landmarks();
    }
    if raw {
        config.summary.method = FitMethod::Difference;
    }
    if log.is_some() {
        config.logging.enabled = true;
    }

    let mut pipeline = SessionPipeline::new(&config);
    let summaries = pipeline.summaries().clone();
    if fuzzy {
        pipeline.add_simulation(
            FuzzySimulation::new("replay", Arc::clone(&graph), start)?.with_summaries(summaries),
        );
    } else {
        pipeline.add_simulation(
            Simulation::new("replay", Arc::clone(&graph), start)?.with_summaries(summaries),
        );
    }
    pipeline.start_session();

    let file = std::fs::File::open(samples)
        .with_context(|| format!("opening samples {}", samples.display()))?;
    let mut rejected = 0usize;
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let sample: Sample = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}", samples.display(), number + 1))?;

        let report = match pipeline.push(sample) {
            Ok(report) => report,
            Err(e) => {
                warn!(line = number + 1, error = %e, "sample rejected");
                rejected += 1;
                continue;
            }
        };
        for change in report.mode_changes() {
            println!(
                "{:>9.3}s  {:<16} display {}",
                report.t,
                graph.name(change.mode),
                graph.name(change.display_mode)
            );
        }
    }

    info!(
        samples = pipeline.total_samples(),
        rejected, "replay finished"
    );

    println!("\nCounts:");
    for (_, sim) in pipeline.simulations() {
        for (id, state) in graph.states() {
            println!("  {:<16} {}", state.name, sim.count(id));
        }
        println!("Final mode: {}", graph.name(sim.mode()));
    }

    if let Some(path) = log {
        std::fs::write(path, pipeline.logger().to_json()?)
            .with_context(|| format!("writing log {}", path.display()))?;
        println!("Log written to {}", path.display());
    }

    Ok(())
}

fn run_check_rules(rules: &Path) -> anyhow::Result<()> {
    let spec = GraphSpec::load(rules).with_context(|| format!("loading rules {}", rules.display()))?;
    let (graph, start) = spec.build()?;
    graph.validate()?;

    println!("{}: {} states, {} transitions", rules.display(), graph.len(), graph.transition_count());
    println!("start: {}", graph.name(start));
    for (_, state) in graph.states() {
        println!(
            "  {:<16} {:<5} window {:.3}s{}",
            state.name,
            state.status.as_str(),
            state.window,
            if state.directional { "" } else { "  (non-directional)" }
        );
        for &tid in &state.transitions {
            if let Some(transition) = graph.transition(tid) {
                println!("    -> delay {:.3}s", transition.delay);
            }
        }
    }
    let landmarks: Vec<&str> = spec.landmarks().iter().map(|l| l.as_str()).collect();
    println!("landmarks: {}", landmarks.join(", "));
    Ok(())
}
