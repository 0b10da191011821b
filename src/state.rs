/// Classification states and the transitions between them.
///
/// A movement is modelled as a small directed graph: each state carries a
/// verdict (good, bad or none) and a smoothing timescale, and each transition
/// carries a classifier that looks at the current summary and names the
/// state the movement is heading to. Returning the source itself means "stay".
///
/// # Architecture
/// - Arena storage: states and transitions live in flat vectors and are
///   addressed by `StateId` / `TransitionId`, so cycles need no shared
///   ownership
/// - Build once, share read-only: a finished graph goes behind an `Arc` and
///   any number of simulations step over it
/// - A transition may be attached to several source states

use std::fmt;
use std::ops::Index;

use crate::summary::Summary;
use crate::types::Status;
use crate::{Error, Result};

/// Stable handle of a state within its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub(crate) usize);

impl StateId {
    /// Position of the state in its graph.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stable handle of a transition within its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransitionId(pub(crate) usize);

impl TransitionId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Maps a summary to the destination of a transition.
///
/// Implemented for plain closures and for [`crate::rules::Rule`]. Errors
/// propagate out of the simulation step; they never corrupt its state.
pub trait Classifier: Send + Sync {
    fn classify(&self, summary: &Summary) -> Result<StateId>;
}

impl<F> Classifier for F
where
    F: Fn(&Summary) -> Result<StateId> + Send + Sync,
{
    fn classify(&self, summary: &Summary) -> Result<StateId> {
        self(summary)
    }
}

/// Pick a state by the sign of `value`, with a dead band of `margin`.
///
/// Returns `positive` if `value >= margin`, `negative` if `value <= -margin`,
/// and `zero` otherwise.
pub fn sign_to_state(
    value: f64,
    margin: f64,
    positive: StateId,
    negative: StateId,
    zero: StateId,
) -> StateId {
    if value >= margin {
        positive
    } else if value <= -margin {
        negative
    } else {
        zero
    }
}

/// Parameters for a new state.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSpec {
    pub name: String,
    pub status: Status,
    /// Smoothing timescale in seconds used while this state is evaluated.
    pub window: f64,
    /// Whether mass arriving from other states waits in the front bucket.
    pub directional: bool,
}

impl StateSpec {
    pub fn new(name: impl Into<String>, status: Status, window: f64) -> Self {
        Self {
            name: name.into(),
            status,
            window,
            directional: true,
        }
    }

    pub fn directional(mut self, directional: bool) -> Self {
        self.directional = directional;
        self
    }
}

/// A state in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub name: String,
    pub status: Status,
    pub window: f64,
    pub directional: bool,
    /// Outgoing transitions, in evaluation order.
    pub transitions: Vec<TransitionId>,
}

/// A decaying transition with its classifier.
pub struct Transition {
    /// Half-life in seconds of the mass flowing through this transition.
    pub delay: f64,
    pub classifier: Box<dyn Classifier>,
}

impl Transition {
    /// Drain rate per second, `ln 2 / delay`.
    pub fn rate(&self) -> f64 {
        std::f64::consts::LN_2 / self.delay
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

/// Arena of states and transitions.
#[derive(Debug, Default)]
pub struct StateGraph {
    states: Vec<State>,
    transitions: Vec<Transition>,
}

impl StateGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a state and return its handle.
    pub fn add_state(&mut self, spec: StateSpec) -> StateId {
        let id = StateId(self.states.len());
        self.states.push(State {
            name: spec.name,
            status: spec.status,
            window: spec.window,
            directional: spec.directional,
            transitions: Vec::new(),
        });
        id
    }

    /// Create a transition out of `from` and attach it there.
    ///
    /// `delay` must be positive and finite.
    pub fn to<C>(&mut self, from: StateId, delay: f64, classifier: C) -> Result<TransitionId>
    where
        C: Classifier + 'static,
    {
        self.check(from)?;
        if !(delay.is_finite() && delay > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "transition delay must be positive and finite, got {}",
                delay
            )));
        }
        let id = TransitionId(self.transitions.len());
        self.transitions.push(Transition {
            delay,
            classifier: Box::new(classifier),
        });
        self.states[from.0].transitions.push(id);
        Ok(id)
    }

    /// Attach an existing transition to another source state.
    pub fn attach(&mut self, state: StateId, transition: TransitionId) -> Result<()> {
        self.check(state)?;
        if transition.0 >= self.transitions.len() {
            return Err(Error::InvalidArgument(format!(
                "unknown transition #{}",
                transition.0
            )));
        }
        let outgoing = &mut self.states[state.0].transitions;
        if !outgoing.contains(&transition) {
            outgoing.push(transition);
        }
        Ok(())
    }

    /// Fail with [`Error::UnknownState`] unless `id` belongs to this graph.
    pub fn check(&self, id: StateId) -> Result<()> {
        if id.0 < self.states.len() {
            Ok(())
        } else {
            Err(Error::UnknownState(format!(
                "{} (graph has {} states)",
                id,
                self.states.len()
            )))
        }
    }

    /// Check every state's window. Called by simulations before binding.
    pub fn validate(&self) -> Result<()> {
        if self.states.is_empty() {
            return Err(Error::InvalidArgument("graph has no states".to_string()));
        }
        for state in &self.states {
            if !(state.window.is_finite() && state.window > 0.0) {
                return Err(Error::InvalidArgument(format!(
                    "state '{}' window must be positive and finite, got {}",
                    state.name, state.window
                )));
            }
        }
        Ok(())
    }

    pub fn state(&self, id: StateId) -> Option<&State> {
        self.states.get(id.0)
    }

    pub fn transition(&self, id: TransitionId) -> Option<&Transition> {
        self.transitions.get(id.0)
    }

    /// Look up a state by name.
    pub fn find(&self, name: &str) -> Option<StateId> {
        self.states
            .iter()
            .position(|state| state.name == name)
            .map(StateId)
    }

    /// All states with their handles, in creation order.
    pub fn states(&self) -> impl Iterator<Item = (StateId, &State)> + '_ {
        self.states
            .iter()
            .enumerate()
            .map(|(i, state)| (StateId(i), state))
    }

    /// Name of a state, or `"?"` for a foreign handle.
    pub fn name(&self, id: StateId) -> &str {
        self.state(id).map_or("?", |state| state.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }
}

impl Index<StateId> for StateGraph {
    type Output = State;

    fn index(&self, id: StateId) -> &State {
        &self.states[id.0]
    }
}

impl Index<TransitionId> for StateGraph {
    type Output = Transition;

    fn index(&self, id: TransitionId) -> &Transition {
        &self.transitions[id.0]
    }
}
