/// Basic usage example: feed landmark samples, watch the coaching state
use std::sync::Arc;

use pose_coach::{
    EngineConfig, FitMethod, FuzzySimulation, GraphSpec, Landmark, LandmarkPoint, Sample,
    SessionPipeline, Simulate, Simulation, StepOutcome, LANDMARK_COUNT,
};

const SQUAT_RULES: &str = include_str!("squat.toml");

fn main() -> pose_coach::Result<()> {
    println!("=== Pose Coach: Basic Example ===\n");

    // Rule graph from the bundled squat file
    let spec = GraphSpec::from_toml_str(SQUAT_RULES)?;
    let (graph, start) = spec.build()?;
    let graph = Arc::new(graph);

    // Only summarize the landmarks the rules read
    let mut config = EngineConfig::default();
    config.summary.landmarks = spec.landmarks();
    config.logging.enabled = true;
    let mut pipeline = SessionPipeline::new(&config);

    // Same graph, two simulations: smoothed fuzzy and raw discrete
    let summaries = pipeline.summaries().clone();
    let fuzzy = pipeline.add_simulation(
        FuzzySimulation::new("fuzzy", Arc::clone(&graph), start)?
            .with_summaries(summaries.clone()),
    );
    let raw = pipeline.add_simulation(
        Simulation::new("raw", Arc::clone(&graph), start)?
            .with_summaries(summaries)
            .with_method(FitMethod::Difference),
    );

    // Two squat reps at 30 Hz: the first deep, the second shallow
    let samples: Vec<Sample> = (0..360)
        .map(|i| squat_sample(i as f64 / 30.0))
        .collect::<pose_coach::Result<_>>()?;
    println!("Processing {} samples...\n", samples.len());

    let mut skipped = 0;
    for sample in samples {
        let report = pipeline.push(sample)?;
        for sim in &report.simulations {
            match &sim.outcome {
                StepOutcome::Stepped { changed: true } => println!(
                    "{:>6.2}s [{:<5}] {:<10} (showing {})",
                    report.t,
                    sim.name,
                    graph.name(sim.mode),
                    graph.name(sim.display_mode)
                ),
                StepOutcome::Skipped(_) => skipped += 1,
                StepOutcome::Failed(e) => println!("{:>6.2}s [{}] failed: {}", report.t, sim.name, e),
                _ => {}
            }
        }
    }

    println!("\n=== Summary ===");
    println!("Skipped steps: {}", skipped);
    for handle in [fuzzy, raw] {
        if let Some(sim) = pipeline.simulation(handle) {
            print_counts(sim);
        }
    }
    println!("Log entries: {}", pipeline.logger().len());
    Ok(())
}

fn print_counts(sim: &dyn Simulate) {
    println!("\n--- {} ---", sim.name());
    for weight in sim.weights() {
        println!(
            "  {:<10} weight {:.3}  entered {} times",
            weight.name,
            weight.weight,
            sim.count(weight.state)
        );
    }
}

/// Standing figure whose hips drop below the knees on the first rep and stop
/// short of them on the second. Estimator y points down.
fn squat_sample(t: f64) -> pose_coach::Result<Sample> {
    let (phase, depth) = if t < 6.0 { (t, 0.7) } else { (t - 6.0, 0.3) };
    let drop = if phase < 1.0 {
        0.0
    } else if phase < 2.0 {
        depth * (phase - 1.0)
    } else if phase < 2.5 {
        depth
    } else if phase < 3.5 {
        depth * (3.5 - phase)
    } else {
        0.0
    };

    let mut points = vec![LandmarkPoint::new(0.0, 0.0, 0.0, Some(0.95)); LANDMARK_COUNT];
    for heel in [Landmark::LeftHeel, Landmark::RightHeel] {
        points[heel.index()].y = 0.9;
    }
    for knee in [Landmark::LeftKnee, Landmark::RightKnee] {
        points[knee.index()].y = 0.5;
    }
    for hip in [Landmark::LeftHip, Landmark::RightHip] {
        points[hip.index()].y = drop as f32;
    }
    Sample::uniform(t, points)
}
