//! Discrete state simulation and the bookkeeping shared with the fuzzy one.
//!
//! A simulation walks a [`StateGraph`] once per sample. The discrete variant
//! holds exactly one current state: every step it summarizes the recorder
//! with that state's window, runs the state's transitions in order and moves
//! to whichever destination the last transition named.
//!
//! Design note: Two notions of "current" are tracked. `mode` follows the
//! classifier exactly. `display_mode` is what a user interface shows: it
//! latches onto good and bad verdicts and only lets a neutral state replace
//! them once another verdict has come and gone. Without the latch a rep that
//! ends in a bad position flashes "bad" for one frame and then vanishes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;

use crate::recorder::Recorder;
use crate::state::{StateGraph, StateId};
use crate::summary::{FitMethod, SummaryBuilder};
use crate::types::Status;
use crate::{Error, Result};

/// Mass held by one state, as reported by [`Simulate::weights`].
#[derive(Debug, Clone, PartialEq)]
pub struct StateWeight {
    pub state: StateId,
    pub name: String,
    /// Mass that arrived from another state and has not settled yet.
    pub front: f64,
    /// Settled mass, the only part eligible to leave.
    pub back: f64,
    /// `front + back`.
    pub weight: f64,
}

/// Common interface of the discrete and fuzzy simulations.
pub trait Simulate: Send {
    fn name(&self) -> &str;

    fn graph(&self) -> &Arc<StateGraph>;

    /// Advance by one sample. `dt` is the time since the previous sample.
    ///
    /// On error the simulation is left exactly as it was.
    fn step(&mut self, recorder: &Recorder, dt: f64) -> Result<()>;

    /// Return to the start state and clear counts.
    fn reset(&mut self);

    /// Per-state mass for every state seen since the last reset, by id.
    fn weights(&self) -> Vec<StateWeight>;

    fn tracker(&self) -> &ModeTracker;

    fn mode(&self) -> StateId {
        self.tracker().mode()
    }

    fn display_mode(&self) -> StateId {
        self.tracker().display_mode()
    }

    /// Number of times the mode changed into `state` since the last reset.
    fn count(&self, state: StateId) -> u64 {
        self.tracker().count(state)
    }
}

/// Validate a step interval. Negative intervals (out-of-order timestamps)
/// are treated as zero.
pub(crate) fn step_interval(dt: f64) -> Result<f64> {
    if dt.is_nan() {
        return Err(Error::InvalidArgument("step interval is NaN".to_string()));
    }
    Ok(dt.max(0.0))
}

// ============================================================================
// MODE TRACKING
// ============================================================================

/// Mode, display mode and per-state counters.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeTracker {
    start: StateId,
    mode: StateId,
    display: StateId,
    counts: BTreeMap<StateId, u64>,
    seen: BTreeSet<StateId>,
}

impl ModeTracker {
    pub fn new(start: StateId) -> Self {
        let mut tracker = Self {
            start,
            mode: start,
            display: start,
            counts: BTreeMap::new(),
            seen: BTreeSet::new(),
        };
        tracker.reset();
        tracker
    }

    pub fn reset(&mut self) {
        self.mode = self.start;
        self.display = self.start;
        self.counts.clear();
        self.seen.clear();
        self.seen.insert(self.start);
    }

    pub fn start(&self) -> StateId {
        self.start
    }

    pub fn mode(&self) -> StateId {
        self.mode
    }

    pub fn display_mode(&self) -> StateId {
        self.display
    }

    pub fn count(&self, state: StateId) -> u64 {
        self.counts.get(&state).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &BTreeMap<StateId, u64> {
        &self.counts
    }

    /// States that have been the mode or held mass since the last reset.
    pub fn seen(&self) -> &BTreeSet<StateId> {
        &self.seen
    }

    pub fn mark_seen(&mut self, state: StateId) {
        self.seen.insert(state);
    }

    /// Apply the outcome of a step. Returns true if the mode changed.
    pub fn update(&mut self, graph: &StateGraph, next: StateId) -> bool {
        self.seen.insert(next);
        let changed = next != self.mode;
        if changed {
            *self.counts.entry(next).or_insert(0) += 1;
            debug!(from = graph.name(self.mode), to = graph.name(next), "mode changed");
            self.mode = next;
        }

        let status = |id: StateId| graph.state(id).map_or(Status::Neutral, |s| s.status);
        if status(self.mode).is_verdict() || status(self.display) == Status::Neutral {
            self.display = self.mode;
        }
        changed
    }
}

// ============================================================================
// DISCRETE SIMULATION
// ============================================================================

/// Single-state walk over a graph.
#[derive(Debug)]
pub struct Simulation {
    name: String,
    graph: Arc<StateGraph>,
    summaries: SummaryBuilder,
    tracker: ModeTracker,
}

impl Simulation {
    /// Bind a simulation to a graph. Fails if the graph is invalid or does
    /// not contain `start`.
    pub fn new(name: impl Into<String>, graph: Arc<StateGraph>, start: StateId) -> Result<Self> {
        graph.validate()?;
        graph.check(start)?;
        Ok(Self {
            name: name.into(),
            graph,
            summaries: SummaryBuilder::default(),
            tracker: ModeTracker::new(start),
        })
    }

    /// Switch between regression fits and two-point differences, keeping
    /// the tracked landmarks and frame.
    pub fn with_method(mut self, method: FitMethod) -> Self {
        self.summaries = SummaryBuilder::new(method)
            .with_landmarks(self.summaries.landmarks())
            .with_frame(self.summaries.frame());
        self
    }

    /// Replace the summary builder (tracked landmarks, frame, method).
    pub fn with_summaries(mut self, summaries: SummaryBuilder) -> Self {
        self.summaries = summaries;
        self
    }

    pub fn summaries(&self) -> &SummaryBuilder {
        &self.summaries
    }
}

impl Simulate for Simulation {
    fn name(&self) -> &str {
        &self.name
    }

    fn graph(&self) -> &Arc<StateGraph> {
        &self.graph
    }

    fn step(&mut self, recorder: &Recorder, dt: f64) -> Result<()> {
        step_interval(dt)?;
        let graph = &self.graph;
        let state = &graph[self.tracker.mode()];
        let summary = self.summaries.summarize(recorder, state.window)?;

        // Last writer wins.
        let mut next = self.tracker.mode();
        for &transition in &state.transitions {
            let destination = graph[transition].classifier.classify(&summary)?;
            graph.check(destination)?;
            next = destination;
        }

        self.tracker.update(graph, next);
        Ok(())
    }

    fn reset(&mut self) {
        self.tracker.reset();
    }

    fn weights(&self) -> Vec<StateWeight> {
        self.tracker
            .seen()
            .iter()
            .map(|&state| {
                let weight = if state == self.tracker.mode() { 1.0 } else { 0.0 };
                StateWeight {
                    state,
                    name: self.graph.name(state).to_string(),
                    front: 0.0,
                    back: weight,
                    weight,
                }
            })
            .collect()
    }

    fn tracker(&self) -> &ModeTracker {
        &self.tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateSpec;
    use crate::summary::Summary;
    use crate::types::{LandmarkPoint, Sample, LANDMARK_COUNT};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder_with_samples(n: usize) -> Recorder {
        let mut recorder = Recorder::with_capacity(30);
        for i in 0..n {
            let points = vec![LandmarkPoint::new(0.1, 0.2, 0.3, Some(1.0)); LANDMARK_COUNT];
            recorder.push(Sample::uniform(i as f64 * 0.1, points).unwrap());
        }
        recorder
    }

    #[test]
    fn test_step_interval() {
        assert_eq!(step_interval(0.1).unwrap(), 0.1);
        assert_eq!(step_interval(-0.5).unwrap(), 0.0);
        assert!(step_interval(f64::NAN).is_err());
    }

    #[test]
    fn test_tracker_counts_changes_once() {
        let mut graph = StateGraph::new();
        let a = graph.add_state(StateSpec::new("a", Status::Neutral, 0.1));
        let b = graph.add_state(StateSpec::new("b", Status::Good, 0.1));
        let mut tracker = ModeTracker::new(a);

        assert!(tracker.update(&graph, b));
        assert!(!tracker.update(&graph, b));
        assert!(tracker.update(&graph, a));
        assert_eq!(tracker.count(b), 1);
        assert_eq!(tracker.count(a), 1);

        tracker.reset();
        assert_eq!(tracker.mode(), a);
        assert!(tracker.counts().is_empty());
        assert_eq!(tracker.seen().len(), 1);
    }

    #[test]
    fn test_display_latches_verdicts() {
        let mut graph = StateGraph::new();
        let none = graph.add_state(StateSpec::new("none", Status::Neutral, 0.1));
        let good = graph.add_state(StateSpec::new("good", Status::Good, 0.1));
        let bad = graph.add_state(StateSpec::new("bad", Status::Bad, 0.1));
        let mut tracker = ModeTracker::new(none);

        tracker.update(&graph, bad);
        assert_eq!(tracker.display_mode(), bad);
        tracker.update(&graph, none);
        assert_eq!(tracker.mode(), none);
        assert_eq!(tracker.display_mode(), bad);
        tracker.update(&graph, good);
        assert_eq!(tracker.display_mode(), good);
    }

    #[test]
    fn test_new_rejects_foreign_start() {
        let mut graph = StateGraph::new();
        graph.add_state(StateSpec::new("a", Status::Neutral, 0.1));
        let foreign = {
            let mut other = StateGraph::new();
            other.add_state(StateSpec::new("x", Status::Neutral, 0.1));
            other.add_state(StateSpec::new("y", Status::Neutral, 0.1))
        };
        assert!(Simulation::new("s", Arc::new(graph), foreign).is_err());
    }

    #[test]
    fn test_last_writer_wins() {
        let mut graph = StateGraph::new();
        let a = graph.add_state(StateSpec::new("a", Status::Neutral, 0.1));
        let b = graph.add_state(StateSpec::new("b", Status::Good, 0.1));
        let c = graph.add_state(StateSpec::new("c", Status::Bad, 0.1));
        graph.to(a, 0.1, move |_: &Summary| Ok(b)).unwrap();
        graph.to(a, 0.1, move |_: &Summary| Ok(c)).unwrap();

        let mut sim = Simulation::new("s", Arc::new(graph), a).unwrap();
        sim.step(&recorder_with_samples(3), 0.1).unwrap();
        assert_eq!(sim.mode(), c);
        assert_eq!(sim.count(b), 0);
        assert_eq!(sim.count(c), 1);
    }

    #[test]
    fn test_failed_step_leaves_state_untouched() {
        let mut graph = StateGraph::new();
        let a = graph.add_state(StateSpec::new("a", Status::Neutral, 0.1));
        let b = graph.add_state(StateSpec::new("b", Status::Good, 0.1));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        graph.to(a, 0.1, move |_: &Summary| Ok(b)).unwrap();
        graph
            .to(a, 0.1, move |_: &Summary| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::Classifier("boom".to_string()))
            })
            .unwrap();

        let mut sim = Simulation::new("s", Arc::new(graph), a).unwrap();
        assert!(sim.step(&recorder_with_samples(3), 0.1).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(sim.mode(), a);
        assert_eq!(sim.count(b), 0);

        // Empty recorder: insufficient data, no classifier runs.
        let err = sim.step(&Recorder::with_capacity(3), 0.1).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_foreign_destination_is_rejected() {
        let mut graph = StateGraph::new();
        let a = graph.add_state(StateSpec::new("a", Status::Neutral, 0.1));
        graph
            .to(a, 0.1, move |_: &Summary| Ok(StateId(42)))
            .unwrap();
        let mut sim = Simulation::new("s", Arc::new(graph), a).unwrap();
        let err = sim.step(&recorder_with_samples(2), 0.1).unwrap_err();
        assert!(matches!(err, Error::UnknownState(_)));
    }

    #[test]
    fn test_discrete_weights_follow_mode() {
        let mut graph = StateGraph::new();
        let a = graph.add_state(StateSpec::new("a", Status::Neutral, 0.1));
        let b = graph.add_state(StateSpec::new("b", Status::Good, 0.1));
        graph.to(a, 0.1, move |_: &Summary| Ok(b)).unwrap();

        let mut sim = Simulation::new("s", Arc::new(graph), a)
            .unwrap()
            .with_method(FitMethod::Difference);
        assert_eq!(sim.summaries().method(), FitMethod::Difference);
        sim.step(&recorder_with_samples(2), 0.1).unwrap();

        let weights = sim.weights();
        assert_eq!(weights.len(), 2);
        assert_eq!(weights[0].weight, 0.0);
        assert_eq!(weights[1].name, "b");
        assert_eq!(weights[1].weight, 1.0);

        sim.reset();
        assert_eq!(sim.mode(), a);
        assert_eq!(sim.weights().len(), 1);
    }
}
