//! Fuzzy state simulation.
//!
//! Instead of sitting in exactly one state, the fuzzy simulation spreads one
//! unit of mass over the graph and lets it flow along transitions with
//! first-order kinetics. The mode is whichever state holds the most mass.
//!
//! Design note: Each state splits its mass into two buckets.
//! - `front`: mass that arrived from a different state during this step
//! - `back`: settled mass; only this bucket drains
//!
//! Non-directional states put everything into `back`. Mass a state routes to
//! itself also goes to `back`. Every `front` settles at the start of the next
//! step, and the mode's `front` settles right after the mode is chosen, so
//! mass passes through at most one transition per step.
//!
//! Why this matters:
//! A classifier that flips back and forth between two destinations for a few
//! frames only moves a small fraction of the mass each time. The mode, and
//! therefore the feedback shown to the user, changes only once the evidence
//! has persisted for about one half-life.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;

use crate::recorder::Recorder;
use crate::simulation::{step_interval, ModeTracker, Simulate, StateWeight};
use crate::state::{StateGraph, StateId, TransitionId};
use crate::summary::{FitMethod, Summary, SummaryBuilder};
use crate::Result;

/// Largest fraction of a state's settled mass that may leave it in one step.
const MAX_DRAIN: f64 = 0.75;

/// Mass held by one state.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Bucket {
    pub front: f64,
    pub back: f64,
}

impl Bucket {
    pub fn weight(&self) -> f64 {
        self.front + self.back
    }
}

/// Mass moved by one transition into one destination during a step.
#[derive(Debug, Clone, Copy, Default)]
struct Flow {
    /// Routed by a source to itself.
    settled: f64,
    /// Routed from a different source.
    arriving: f64,
}

/// One classification made during a step.
#[derive(Debug, Clone, Copy)]
struct Route {
    source: StateId,
    transition: TransitionId,
    destination: StateId,
}

/// Mass-flow walk over a graph.
#[derive(Debug)]
pub struct FuzzySimulation {
    name: String,
    graph: Arc<StateGraph>,
    summaries: SummaryBuilder,
    buckets: Vec<Bucket>,
    /// Every destination each transition has produced, in id order.
    outputs: Vec<BTreeSet<StateId>>,
    tracker: ModeTracker,
}

impl FuzzySimulation {
    /// Bind a simulation to a graph with all mass settled in `start`.
    pub fn new(name: impl Into<String>, graph: Arc<StateGraph>, start: StateId) -> Result<Self> {
        graph.validate()?;
        graph.check(start)?;
        let mut sim = Self {
            name: name.into(),
            buckets: vec![Bucket::default(); graph.len()],
            outputs: vec![BTreeSet::new(); graph.transition_count()],
            graph,
            summaries: SummaryBuilder::default(),
            tracker: ModeTracker::new(start),
        };
        sim.reset();
        Ok(sim)
    }

    pub fn with_method(mut self, method: FitMethod) -> Self {
        self.summaries = SummaryBuilder::new(method)
            .with_landmarks(self.summaries.landmarks())
            .with_frame(self.summaries.frame());
        self
    }

    pub fn with_summaries(mut self, summaries: SummaryBuilder) -> Self {
        self.summaries = summaries;
        self
    }

    pub fn summaries(&self) -> &SummaryBuilder {
        &self.summaries
    }

    /// Buckets of one state.
    pub fn bucket(&self, state: StateId) -> Option<Bucket> {
        self.buckets.get(state.index()).copied()
    }

    /// Combined mass of one state; 0 for foreign handles.
    pub fn weight(&self, state: StateId) -> f64 {
        self.bucket(state).map_or(0.0, |b| b.weight())
    }

    /// Sum of all mass. Stays at 1 up to rounding.
    pub fn total_mass(&self) -> f64 {
        self.buckets.iter().map(Bucket::weight).sum()
    }

    /// Destinations a transition has produced so far.
    pub fn outputs(&self, transition: TransitionId) -> Option<&BTreeSet<StateId>> {
        self.outputs.get(transition.index())
    }

    /// Run every classifier the current mass distribution needs.
    fn classify(&self, recorder: &Recorder) -> Result<Vec<Route>> {
        let graph = &self.graph;
        let mut cache: Vec<(u64, Summary)> = Vec::new();
        let mut routes = Vec::new();

        for (source, state) in graph.states() {
            if state.transitions.is_empty() || self.buckets[source.index()].weight() <= 0.0 {
                continue;
            }

            // States sharing a window share a summary.
            let key = state.window.to_bits();
            let slot = match cache.iter().position(|(k, _)| *k == key) {
                Some(slot) => slot,
                None => {
                    let summary = self.summaries.summarize(recorder, state.window)?;
                    cache.push((key, summary));
                    cache.len() - 1
                }
            };
            let summary = &cache[slot].1;

            for &transition in &state.transitions {
                let destination = graph[transition].classifier.classify(summary)?;
                graph.check(destination)?;
                routes.push(Route {
                    source,
                    transition,
                    destination,
                });
            }
        }

        Ok(routes)
    }
}

impl Simulate for FuzzySimulation {
    fn name(&self) -> &str {
        &self.name
    }

    fn graph(&self) -> &Arc<StateGraph> {
        &self.graph
    }

    fn step(&mut self, recorder: &Recorder, dt: f64) -> Result<()> {
        let dt = step_interval(dt)?;
        let routes = self.classify(recorder)?;
        let graph = Arc::clone(&self.graph);

        // Mass that arrived during an earlier step has settled.
        for bucket in &mut self.buckets {
            bucket.back += bucket.front;
            bucket.front = 0.0;
        }

        // Drains, all computed from the mass at the start of the step.
        let mut rate_sum = vec![0.0; self.buckets.len()];
        for route in &routes {
            rate_sum[route.source.index()] += graph[route.transition].rate();
        }

        let mut drained = vec![0.0; self.buckets.len()];
        let mut flows: BTreeMap<(TransitionId, StateId), Flow> = BTreeMap::new();
        for route in &routes {
            self.outputs[route.transition.index()].insert(route.destination);

            let source = route.source.index();
            let back = self.buckets[source].back;
            let total_rate = rate_sum[source];
            if back <= 0.0 || total_rate <= 0.0 || dt == 0.0 {
                continue;
            }
            let fraction = (total_rate * dt).min(MAX_DRAIN);
            let amount = back * fraction * graph[route.transition].rate() / total_rate;
            drained[source] += amount;

            let flow = flows
                .entry((route.transition, route.destination))
                .or_default();
            if route.destination == route.source {
                flow.settled += amount;
            } else {
                flow.arriving += amount;
            }
        }

        for (bucket, amount) in self.buckets.iter_mut().zip(&drained) {
            bucket.back = (bucket.back - amount).max(0.0);
        }

        // Deposits, in transition order then destination order.
        for (index, destinations) in self.outputs.iter().enumerate() {
            for &destination in destinations {
                let flow = match flows.get(&(TransitionId(index), destination)) {
                    Some(flow) => *flow,
                    None => continue,
                };
                let bucket = &mut self.buckets[destination.index()];
                bucket.back += flow.settled;
                if graph[destination].directional {
                    bucket.front += flow.arriving;
                } else {
                    bucket.back += flow.arriving;
                }
                if flow.settled + flow.arriving > 0.0 {
                    self.tracker.mark_seen(destination);
                }
            }
        }

        // Exact ties keep the previous mode.
        let mut mode = self.tracker.mode();
        let mut best = self.buckets[mode.index()].weight();
        for (index, bucket) in self.buckets.iter().enumerate() {
            if bucket.weight() > best {
                best = bucket.weight();
                mode = StateId(index);
            }
        }

        let bucket = &mut self.buckets[mode.index()];
        bucket.back += bucket.front;
        bucket.front = 0.0;

        self.tracker.update(&graph, mode);
        Ok(())
    }

    fn reset(&mut self) {
        for bucket in &mut self.buckets {
            *bucket = Bucket::default();
        }
        self.buckets[self.tracker.start().index()].back = 1.0;
        self.tracker.reset();
    }

    fn weights(&self) -> Vec<StateWeight> {
        self.tracker
            .seen()
            .iter()
            .map(|&state| {
                let bucket = self.bucket(state).unwrap_or_default();
                StateWeight {
                    state,
                    name: self.graph.name(state).to_string(),
                    front: bucket.front,
                    back: bucket.back,
                    weight: bucket.weight(),
                }
            })
            .collect()
    }

    fn tracker(&self) -> &ModeTracker {
        &self.tracker
    }
}
