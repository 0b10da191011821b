//! Pose Coaching Engine Library
//!
//! Turns a live stream of body-landmark samples into stable, human-meaningful
//! movement classifications ("good rep", "hips above knees") suitable for
//! real-time coaching feedback.
//!
//! # Design Philosophy
//!
//! - **Smooth before you judge**: every landmark channel passes through a
//!   confidence-weighted exponential regression before any rule sees it, so
//!   occlusion flicker and estimator jitter never reach the classifier.
//! - **Soft decisions, stable output**: the fuzzy simulation moves fractional
//!   mass between states instead of jumping, and the display mode holds a
//!   verdict until a new verdict replaces it.
//! - **Rules are data**: state graphs are built once, from code or from a rule
//!   file, and shared read-only by any number of simulations.
//! - **Fail per frame, never per session**: insufficient data or a failing
//!   rule skips one step of one simulation and nothing else.
//!
//! # Pipeline
//!
//! ```text
//! Sample -> Recorder -> SummaryBuilder (fit) -> Classifier -> Simulation -> mode / display_mode
//!                                                                  |
//!                                                                  +-> StepLogger
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pose_coach::{FuzzySimulation, Landmark, StateGraph, StateSpec, Status, sign_to_state};
//!
//! let mut graph = StateGraph::new();
//! let top = graph.add_state(StateSpec::new("top", Status::Neutral, 0.2));
//! let down = graph.add_state(StateSpec::new("down", Status::Good, 0.1));
//! graph.to(top, 0.1, move |s: &pose_coach::Summary| {
//!     Ok(sign_to_state(s.vel(Landmark::LeftHip)?.y, 0.1, top, down, top))
//! })?;
//!
//! let mut sim = FuzzySimulation::new("squats", Arc::new(graph), top)?;
//! ```

use thiserror::Error as ThisError;

pub mod cli;
pub mod config;
pub mod fit;
pub mod fuzzy;
pub mod logger;
pub mod pipeline;
pub mod recorder;
pub mod rules;
pub mod simulation;
pub mod state;
pub mod summary;
pub mod types;


// Re-export commonly used types
pub use config::{EngineConfig, LoggingConfig, SummaryConfig};
pub use fit::{weighted_fit, Fit};
pub use fuzzy::{Bucket, FuzzySimulation};
pub use logger::{LogEntry, MemoryLog, StepLogger};
pub use pipeline::{SessionPipeline, SimulationHandle, SimulationReport, StepOutcome, StepReport};
pub use recorder::{Recorder, RecorderConfig};
pub use rules::{GraphSpec, Rule, Signal, Target, Term};
pub use simulation::{ModeTracker, Simulate, Simulation, StateWeight};
pub use state::{sign_to_state, Classifier, State, StateGraph, StateId, StateSpec, Transition, TransitionId};
pub use summary::{FitMethod, Summary, SummaryBuilder};
pub use types::{Channel, Frame, Landmark, LandmarkPoint, Sample, Status, Vector3, LANDMARK_COUNT};

/// Result type alias for the engine
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the engine
#[derive(Debug, ThisError)]
pub enum Error {
    /// Not enough usable samples for an estimate. Recoverable: skip the step
    /// and try again on the next sample.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown state: {0}")]
    UnknownState(String),

    #[error("Landmark {0} is not tracked by this summary")]
    MissingLandmark(Landmark),

    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// True for errors that only mean "try again on the next sample".
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::InsufficientData(_))
    }
}
