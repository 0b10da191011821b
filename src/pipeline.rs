/// Session pipeline driving every registered simulation from one sample stream.
///
/// This module owns the data flow for a coaching session: each incoming
/// sample is recorded, the elapsed time since the previous sample is
/// computed, and every registered simulation is stepped once, in registration
/// order, against the shared recorder.
///
/// # Architecture
///
/// The pipeline is strictly pull-driven and single-threaded:
/// 1. **Record**: validate the sample and push it into the recorder
/// 2. **Step**: advance each simulation by `dt`
/// 3. **Isolate**: a failing simulation is reported and skipped; the others
///    still step
/// 4. **Log**: per-state weights and counts go to the step logger
///
/// Insufficient data (a fresh buffer, an occluded landmark) only skips one
/// step of one simulation. Nothing a simulation does can fail the session.

use tracing::{debug, trace, warn};

use crate::config::EngineConfig;
use crate::logger::{LogEntry, MemoryLog, StepLogger};
use crate::recorder::Recorder;
use crate::simulation::Simulate;
use crate::state::StateId;
use crate::summary::SummaryBuilder;
use crate::types::Sample;
use crate::Result;

/// Stable handle of a registered simulation. Never reused within a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimulationHandle(u64);

/// What happened to one simulation during a step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The simulation advanced. `changed` is true if its mode changed.
    Stepped { changed: bool },
    /// Not enough data yet; nothing changed.
    Skipped(String),
    /// The step failed; nothing changed.
    Failed(String),
}

/// Per-simulation result of a step.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub handle: SimulationHandle,
    pub name: String,
    pub mode: StateId,
    pub display_mode: StateId,
    pub outcome: StepOutcome,
}

/// Result of pushing one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// Time of the pushed sample.
    pub t: f64,
    /// Interval the simulations were stepped by.
    pub dt: f64,
    pub simulations: Vec<SimulationReport>,
}

impl StepReport {
    /// Reports of simulations whose mode changed this step.
    pub fn mode_changes(&self) -> impl Iterator<Item = &SimulationReport> + '_ {
        self.simulations
            .iter()
            .filter(|report| matches!(report.outcome, StepOutcome::Stepped { changed: true }))
    }

    pub fn failures(&self) -> usize {
        self.simulations
            .iter()
            .filter(|report| matches!(report.outcome, StepOutcome::Failed(_)))
            .count()
    }
}

/// Recorder, simulations and step log for one sample stream.
pub struct SessionPipeline<L: StepLogger = MemoryLog> {
    recorder: Recorder,
    summaries: SummaryBuilder,
    simulations: Vec<(SimulationHandle, Box<dyn Simulate>)>,
    logger: L,
    last_t: Option<f64>,
    next_handle: u64,
    total_samples: u64,
}

impl SessionPipeline<MemoryLog> {
    /// Creates a pipeline logging to memory when `config.logging.enabled`.
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_logger(config, MemoryLog::new(config.logging.enabled))
    }
}

impl<L: StepLogger> SessionPipeline<L> {
    pub fn with_logger(config: &EngineConfig, logger: L) -> Self {
        Self {
            recorder: Recorder::new(config.recorder.clone()),
            summaries: config.summary.builder(),
            simulations: Vec::new(),
            logger,
            last_t: None,
            next_handle: 0,
            total_samples: 0,
        }
    }

    /// Summary settings from the configuration, for building simulations.
    pub fn summaries(&self) -> &SummaryBuilder {
        &self.summaries
    }

    /// Register a simulation. It is stepped after every earlier one.
    pub fn add_simulation<S: Simulate + 'static>(&mut self, simulation: S) -> SimulationHandle {
        let handle = SimulationHandle(self.next_handle);
        self.next_handle += 1;
        debug!(name = simulation.name(), "simulation registered");
        self.simulations.push((handle, Box::new(simulation)));
        handle
    }

    /// Deregister a simulation and hand it back.
    pub fn remove_simulation(&mut self, handle: SimulationHandle) -> Option<Box<dyn Simulate>> {
        let index = self.simulations.iter().position(|(h, _)| *h == handle)?;
        Some(self.simulations.remove(index).1)
    }

    pub fn simulation(&self, handle: SimulationHandle) -> Option<&dyn Simulate> {
        self.simulations
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, simulation)| simulation.as_ref())
    }

    /// Registered simulations in stepping order.
    pub fn simulations(&self) -> impl Iterator<Item = (SimulationHandle, &dyn Simulate)> + '_ {
        self.simulations
            .iter()
            .map(|(handle, simulation)| (*handle, simulation.as_ref()))
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn logger(&self) -> &L {
        &self.logger
    }

    pub fn logger_mut(&mut self) -> &mut L {
        &mut self.logger
    }

    /// Samples pushed since the session started.
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    /// Begin a new session: empty buffer, simulations at their start
    /// states, empty log.
    pub fn start_session(&mut self) {
        self.recorder.clear();
        for (_, simulation) in &mut self.simulations {
            simulation.reset();
        }
        self.logger.clear();
        self.last_t = None;
        self.total_samples = 0;
        debug!(simulations = self.simulations.len(), "session started");
    }

    /// Record one sample and step every simulation.
    ///
    /// Fails only for malformed samples, which are not recorded. A sample
    /// stamped earlier than the previous one is recorded at the previous
    /// time, so the buffer stays in time order.
    pub fn push(&mut self, mut sample: Sample) -> Result<StepReport> {
        sample.validate()?;
        let dt = match self.last_t {
            Some(last) if sample.t < last => {
                debug!(t = sample.t, last, "sample time went backwards, clamping");
                sample.t = last;
                0.0
            }
            Some(last) => sample.t - last,
            None => 0.0,
        };
        let t = sample.t;
        self.last_t = Some(t);
        self.recorder.push(sample);
        self.total_samples += 1;

        let mut reports = Vec::with_capacity(self.simulations.len());
        for (handle, simulation) in &mut self.simulations {
            let before = simulation.mode();
            let outcome = match simulation.step(&self.recorder, dt) {
                Ok(()) => StepOutcome::Stepped {
                    changed: simulation.mode() != before,
                },
                Err(e) if e.is_recoverable() => {
                    debug!(simulation = simulation.name(), error = %e, "step skipped");
                    StepOutcome::Skipped(e.to_string())
                }
                Err(e) => {
                    warn!(simulation = simulation.name(), error = %e, "simulation step failed");
                    StepOutcome::Failed(e.to_string())
                }
            };

            if self.logger.is_enabled() {
                for weight in simulation.weights() {
                    trace!(simulation = simulation.name(), state = %weight.name, weight = weight.weight);
                    self.logger.record(LogEntry {
                        t,
                        simulation: simulation.name().to_string(),
                        state: weight.name,
                        weight: weight.weight,
                        count: simulation.count(weight.state),
                    });
                }
            }

            reports.push(SimulationReport {
                handle: *handle,
                name: simulation.name().to_string(),
                mode: simulation.mode(),
                display_mode: simulation.display_mode(),
                outcome,
            });
        }

        Ok(StepReport {
            t,
            dt,
            simulations: reports,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::fuzzy::FuzzySimulation;
    use crate::simulation::Simulation;
    use crate::state::{StateGraph, StateSpec};
    use crate::summary::Summary;
    use crate::types::{Landmark, LandmarkPoint, Status, LANDMARK_COUNT};
    use crate::Error;

    fn sample(t: f64) -> Sample {
        let points = vec![LandmarkPoint::new(0.0, 0.0, 0.0, Some(1.0)); LANDMARK_COUNT];
        Sample::uniform(t, points).unwrap()
    }

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.summary.landmarks = vec![Landmark::LeftHip];
        config.logging.enabled = true;
        config
    }

    /// a -> b immediately.
    fn graph() -> (Arc<StateGraph>, StateId, StateId) {
        let mut graph = StateGraph::new();
        let a = graph.add_state(StateSpec::new("a", Status::Neutral, 0.1));
        let b = graph.add_state(StateSpec::new("b", Status::Good, 0.1));
        graph.to(a, 0.1, move |_: &Summary| Ok(b)).unwrap();
        (Arc::new(graph), a, b)
    }

    #[test]
    fn test_pipeline_creation() {
        let pipeline = SessionPipeline::new(&EngineConfig::default());
        assert_eq!(pipeline.total_samples(), 0);
        assert!(pipeline.recorder().is_empty());
        assert!(!pipeline.logger().is_enabled());
        assert_eq!(pipeline.simulations().count(), 0);
    }

    #[test]
    fn test_first_sample_has_zero_dt() {
        let mut pipeline = SessionPipeline::new(&config());
        assert_eq!(pipeline.push(sample(3.0)).unwrap().dt, 0.0);
        let report = pipeline.push(sample(3.1)).unwrap();
        assert!((report.dt - 0.1).abs() < 1e-12);
        assert_eq!(pipeline.push(sample(2.0)).unwrap().dt, 0.0);
    }

    #[test]
    fn test_backwards_sample_is_clamped() {
        let (graph, a, _) = graph();
        let mut pipeline = SessionPipeline::new(&config());
        let summaries = pipeline.summaries().clone();
        pipeline.add_simulation(FuzzySimulation::new("s", graph, a).unwrap().with_summaries(summaries));

        pipeline.push(sample(10.0)).unwrap();
        pipeline.push(sample(10.1)).unwrap();
        let report = pipeline.push(sample(-5000.0)).unwrap();
        assert_eq!(report.t, 10.1);
        assert_eq!(report.dt, 0.0);
        assert!(matches!(report.simulations[0].outcome, StepOutcome::Stepped { .. }));

        let times = pipeline.recorder().times(None);
        assert_eq!(times, vec![10.0, 10.1, 10.1]);

        let report = pipeline.push(sample(10.2)).unwrap();
        assert!((report.dt - 0.1).abs() < 1e-12);
        assert_eq!(report.failures(), 0);
    }

    #[test]
    fn test_malformed_sample_rejected() {
        let mut pipeline = SessionPipeline::new(&config());
        let bad = Sample {
            t: 0.0,
            timestamp_ms: 0,
            world: vec![],
            screen: vec![],
        };
        assert!(pipeline.push(bad).is_err());
        assert!(pipeline.recorder().is_empty());
    }

    #[test]
    fn test_failure_isolation() {
        let mut broken = StateGraph::new();
        let x = broken.add_state(StateSpec::new("x", Status::Neutral, 0.1));
        broken
            .to(x, 0.1, |_: &Summary| Err(Error::Classifier("broken".to_string())))
            .unwrap();

        let (graph, a, b) = graph();
        let mut pipeline = SessionPipeline::new(&config());
        let summaries = pipeline.summaries().clone();
        let bad = pipeline.add_simulation(
            Simulation::new("broken", Arc::new(broken), x)
                .unwrap()
                .with_summaries(summaries.clone()),
        );
        let good = pipeline.add_simulation(
            Simulation::new("good", graph, a).unwrap().with_summaries(summaries),
        );

        let report = pipeline.push(sample(0.0)).unwrap();
        assert_eq!(report.failures(), 1);
        assert_eq!(report.simulations[0].handle, bad);
        assert_eq!(report.simulations[1].outcome, StepOutcome::Stepped { changed: true });
        assert_eq!(pipeline.simulation(good).unwrap().mode(), b);
        assert_eq!(report.mode_changes().count(), 1);
    }

    #[test]
    fn test_insufficient_data_is_skipped() {
        let (graph, a, _) = graph();
        let mut pipeline = SessionPipeline::new(&config());
        let summaries = pipeline.summaries().clone().with_landmarks(&[Landmark::Nose]);
        pipeline.add_simulation(Simulation::new("s", graph, a).unwrap().with_summaries(summaries));

        let mut hidden = sample(0.0);
        hidden.world[Landmark::Nose.index()].visibility = None;
        let report = pipeline.push(hidden).unwrap();
        assert!(matches!(report.simulations[0].outcome, StepOutcome::Skipped(_)));
        assert_eq!(report.failures(), 0);
        assert_eq!(report.simulations[0].mode, a);
    }

    #[test]
    fn test_handles_survive_removal() {
        let (graph, a, _) = graph();
        let mut pipeline = SessionPipeline::new(&config());
        let first = pipeline.add_simulation(Simulation::new("first", Arc::clone(&graph), a).unwrap());
        let second = pipeline.add_simulation(FuzzySimulation::new("second", graph, a).unwrap());

        let removed = pipeline.remove_simulation(first).unwrap();
        assert_eq!(removed.name(), "first");
        assert!(pipeline.simulation(first).is_none());
        assert!(pipeline.remove_simulation(first).is_none());
        assert_eq!(pipeline.simulation(second).unwrap().name(), "second");
    }

    #[test]
    fn test_log_entries_and_session_restart() {
        let (graph, a, b) = graph();
        let mut pipeline = SessionPipeline::new(&config());
        let summaries = pipeline.summaries().clone();
        let handle = pipeline.add_simulation(
            FuzzySimulation::new("fuzzy", graph, a).unwrap().with_summaries(summaries),
        );

        pipeline.push(sample(0.0)).unwrap();
        pipeline.push(sample(0.1)).unwrap();
        // First step: only `a` has held mass. Second: `a` and `b`.
        assert_eq!(pipeline.logger().len(), 3);
        let last = &pipeline.logger().entries()[2];
        assert_eq!(last.state, "b");
        assert_eq!(last.count, 1);
        assert!((last.t - 0.1).abs() < 1e-12);

        pipeline.start_session();
        assert!(pipeline.logger().is_empty());
        assert!(pipeline.recorder().is_empty());
        let sim = pipeline.simulation(handle).unwrap();
        assert_eq!(sim.mode(), a);
        assert_eq!(sim.count(b), 0);
        assert_eq!(pipeline.push(sample(5.0)).unwrap().dt, 0.0);
    }
}
