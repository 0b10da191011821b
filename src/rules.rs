//! Declarative state graphs.
//!
//! Graphs can be written by hand in code, but most movements fit a handful
//! of rule shapes: "always go to X", "go to X when this quantity is below a
//! bound", "go up, down or stay depending on the sign of a velocity". Rule
//! files describe a graph with those shapes in TOML:
//!
//! ```toml
//! start = "top"
//!
//! [[states]]
//! name = "top"
//! window = 0.2
//!
//! [[states.transitions]]
//! delay = 0.1
//!
//! [states.transitions.rule]
//! kind = "sign"
//! margin = 0.1
//! positive = "top"
//! negative = "down"
//! zero = "top"
//! signal = [
//!     { landmark = "LEFT_HIP", quantity = "vel", axis = "y" },
//!     { landmark = "RIGHT_HIP", quantity = "vel", axis = "y" },
//! ]
//! ```
//!
//! A rule's targets are either a state name or a nested rule, so decision
//! trees nest without extra states.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::state::{Classifier, StateGraph, StateId, StateSpec};
use crate::summary::Summary;
use crate::types::{Landmark, Status};
use crate::{Error, Result};

/// Which estimate of a landmark a term reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quantity {
    Pos,
    Vel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

fn one() -> f64 {
    1.0
}

fn is_one(value: &f64) -> bool {
    *value == 1.0
}

/// One weighted landmark component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub landmark: Landmark,
    pub quantity: Quantity,
    pub axis: Axis,
    #[serde(default = "one", skip_serializing_if = "is_one")]
    pub coeff: f64,
}

impl Term {
    pub fn new(landmark: Landmark, quantity: Quantity, axis: Axis) -> Self {
        Self {
            landmark,
            quantity,
            axis,
            coeff: 1.0,
        }
    }

    pub fn scaled(mut self, coeff: f64) -> Self {
        self.coeff = coeff;
        self
    }

    fn evaluate(&self, summary: &Summary) -> Result<f64> {
        let vector = match self.quantity {
            Quantity::Pos => summary.pos(self.landmark)?,
            Quantity::Vel => summary.vel(self.landmark)?,
        };
        let component = match self.axis {
            Axis::X => vector.x,
            Axis::Y => vector.y,
            Axis::Z => vector.z,
        };
        Ok(self.coeff * component)
    }
}

/// Weighted sum of landmark components.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signal(pub Vec<Term>);

impl Signal {
    pub fn evaluate(&self, summary: &Summary) -> Result<f64> {
        self.0.iter().map(|term| term.evaluate(summary)).sum()
    }

    pub fn landmarks(&self) -> impl Iterator<Item = Landmark> + '_ {
        self.0.iter().map(|term| term.landmark)
    }
}

/// Where a rule sends the movement: a state, or another rule to consult.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target<S = String> {
    State(S),
    Rule(Box<Rule<S>>),
}

/// A transition classifier described as data.
///
/// `Rule<String>` is what rule files contain; [`GraphSpec::build`] resolves
/// the names into a `Rule<StateId>`, which is a [`Classifier`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Rule<S = String> {
    /// Unconditionally go to `to`.
    Always { to: Target<S> },
    /// `to_below` when `signal < below`, `otherwise` otherwise.
    Threshold {
        signal: Signal,
        below: f64,
        to_below: Target<S>,
        otherwise: Target<S>,
    },
    /// Three-way split on the sign of `signal` with a dead band of `margin`.
    Sign {
        signal: Signal,
        margin: f64,
        positive: Target<S>,
        negative: Target<S>,
        zero: Target<S>,
    },
}

impl Rule<String> {
    /// Replace state names by handles and check numeric parameters.
    pub fn resolve<F>(&self, lookup: &F) -> Result<Rule<StateId>>
    where
        F: Fn(&str) -> Result<StateId>,
    {
        Ok(match self {
            Rule::Always { to } => Rule::Always {
                to: resolve_target(to, lookup)?,
            },
            Rule::Threshold {
                signal,
                below,
                to_below,
                otherwise,
            } => {
                if !below.is_finite() {
                    return Err(Error::Config(format!(
                        "threshold bound must be finite, got {}",
                        below
                    )));
                }
                Rule::Threshold {
                    signal: signal.clone(),
                    below: *below,
                    to_below: resolve_target(to_below, lookup)?,
                    otherwise: resolve_target(otherwise, lookup)?,
                }
            }
            Rule::Sign {
                signal,
                margin,
                positive,
                negative,
                zero,
            } => {
                if !(margin.is_finite() && *margin >= 0.0) {
                    return Err(Error::Config(format!(
                        "sign margin must be finite and non-negative, got {}",
                        margin
                    )));
                }
                Rule::Sign {
                    signal: signal.clone(),
                    margin: *margin,
                    positive: resolve_target(positive, lookup)?,
                    negative: resolve_target(negative, lookup)?,
                    zero: resolve_target(zero, lookup)?,
                }
            }
        })
    }
}

fn resolve_target<F>(target: &Target<String>, lookup: &F) -> Result<Target<StateId>>
where
    F: Fn(&str) -> Result<StateId>,
{
    Ok(match target {
        Target::State(name) => Target::State(lookup(name)?),
        Target::Rule(rule) => Target::Rule(Box::new(rule.resolve(lookup)?)),
    })
}

impl<S> Rule<S> {
    /// Every landmark the rule reads, including nested rules.
    pub fn landmarks(&self, into: &mut BTreeSet<Landmark>) {
        let nested = |target: &Target<S>, into: &mut BTreeSet<Landmark>| {
            if let Target::Rule(rule) = target {
                rule.landmarks(into);
            }
        };
        match self {
            Rule::Always { to } => nested(to, into),
            Rule::Threshold {
                signal,
                to_below,
                otherwise,
                ..
            } => {
                into.extend(signal.landmarks());
                nested(to_below, into);
                nested(otherwise, into);
            }
            Rule::Sign {
                signal,
                positive,
                negative,
                zero,
                ..
            } => {
                into.extend(signal.landmarks());
                nested(positive, into);
                nested(negative, into);
                nested(zero, into);
            }
        }
    }
}

impl Target<StateId> {
    fn pick(&self, summary: &Summary) -> Result<StateId> {
        match self {
            Target::State(id) => Ok(*id),
            Target::Rule(rule) => rule.classify(summary),
        }
    }
}

impl Classifier for Rule<StateId> {
    fn classify(&self, summary: &Summary) -> Result<StateId> {
        match self {
            Rule::Always { to } => to.pick(summary),
            Rule::Threshold {
                signal,
                below,
                to_below,
                otherwise,
            } => {
                if signal.evaluate(summary)? < *below {
                    to_below.pick(summary)
                } else {
                    otherwise.pick(summary)
                }
            }
            Rule::Sign {
                signal,
                margin,
                positive,
                negative,
                zero,
            } => {
                let value = signal.evaluate(summary)?;
                if value >= *margin {
                    positive.pick(summary)
                } else if value <= -*margin {
                    negative.pick(summary)
                } else {
                    zero.pick(summary)
                }
            }
        }
    }
}

// ============================================================================
// GRAPH FILES
// ============================================================================

fn default_true() -> bool {
    true
}

/// A transition as written in a rule file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEntry {
    /// Half-life in seconds.
    pub delay: f64,
    pub rule: Rule,
    /// Further source states sharing this transition.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub also: Vec<String>,
}

/// A state as written in a rule file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    pub name: String,
    #[serde(default)]
    pub status: Status,
    pub window: f64,
    #[serde(default = "default_true")]
    pub directional: bool,
    #[serde(default)]
    pub transitions: Vec<TransitionEntry>,
}

/// A whole graph plus its start state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSpec {
    pub start: String,
    #[serde(default)]
    pub states: Vec<StateEntry>,
}

impl GraphSpec {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read a rule file. The graph is not built; call [`GraphSpec::build`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Landmarks read by any rule, in estimator order.
    pub fn landmarks(&self) -> Vec<Landmark> {
        let mut set = BTreeSet::new();
        for state in &self.states {
            for transition in &state.transitions {
                transition.rule.landmarks(&mut set);
            }
        }
        set.into_iter().collect()
    }

    /// Build the graph and resolve the start state.
    pub fn build(&self) -> Result<(StateGraph, StateId)> {
        let mut graph = StateGraph::new();
        let mut ids: HashMap<&str, StateId> = HashMap::new();
        for entry in &self.states {
            let id = graph.add_state(
                StateSpec::new(entry.name.as_str(), entry.status, entry.window)
                    .directional(entry.directional),
            );
            if ids.insert(entry.name.as_str(), id).is_some() {
                return Err(Error::Config(format!("duplicate state '{}'", entry.name)));
            }
        }
        graph.validate()?;

        let lookup = |name: &str| -> Result<StateId> {
            ids.get(name)
                .copied()
                .ok_or_else(|| Error::UnknownState(name.to_string()))
        };

        for entry in &self.states {
            let source = lookup(&entry.name)?;
            for transition in &entry.transitions {
                let rule = transition.rule.resolve(&lookup)?;
                let id = graph.to(source, transition.delay, rule)?;
                for other in &transition.also {
                    graph.attach(lookup(other)?, id)?;
                }
            }
        }

        let start = lookup(&self.start)?;
        Ok((graph, start))
    }
}
