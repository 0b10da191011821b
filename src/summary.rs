//! Per-landmark position and velocity summaries.
//!
//! A [`Summary`] is what classifiers see: for each tracked landmark, its
//! smoothed 3D position and velocity at the newest sample. It is rebuilt
//! from the recorder on every step with the timescale of whichever state is
//! asking, so a slow "top" state and a quick "down" state read the same
//! stream at different smoothing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fit::{weighted_fit, Fit};
use crate::recorder::Recorder;
use crate::types::{Channel, Frame, Landmark, Vector3};
use crate::{Error, Result};

/// How velocities are estimated from the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMethod {
    /// Exponentially weighted regression over the whole buffer.
    #[default]
    Regression,
    /// Two-point difference of the newest samples. Noisier, but reacts
    /// within one frame.
    Difference,
}

/// Smoothed positions and velocities at one instant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Summary {
    /// Time of the newest sample the summary was built from.
    pub t: f64,
    pub pos: BTreeMap<Landmark, Vector3>,
    pub vel: BTreeMap<Landmark, Vector3>,
}

impl Summary {
    /// Smoothed position of a landmark.
    pub fn pos(&self, landmark: Landmark) -> Result<Vector3> {
        self.pos
            .get(&landmark)
            .copied()
            .ok_or(Error::MissingLandmark(landmark))
    }

    /// Smoothed velocity of a landmark, in frame units per second.
    pub fn vel(&self, landmark: Landmark) -> Result<Vector3> {
        self.vel
            .get(&landmark)
            .copied()
            .ok_or(Error::MissingLandmark(landmark))
    }

    pub fn contains(&self, landmark: Landmark) -> bool {
        self.pos.contains_key(&landmark)
    }
}

/// Builds summaries from a recorder.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryBuilder {
    landmarks: Vec<Landmark>,
    frame: Frame,
    method: FitMethod,
}

impl Default for SummaryBuilder {
    fn default() -> Self {
        Self::new(FitMethod::Regression)
    }
}

impl SummaryBuilder {
    /// Track every landmark in the world frame.
    pub fn new(method: FitMethod) -> Self {
        Self {
            landmarks: Landmark::ALL.to_vec(),
            frame: Frame::World,
            method,
        }
    }

    /// Restrict the summary to a subset of landmarks. An empty list means all.
    pub fn with_landmarks(mut self, landmarks: &[Landmark]) -> Self {
        self.landmarks = if landmarks.is_empty() {
            Landmark::ALL.to_vec()
        } else {
            let mut unique = landmarks.to_vec();
            unique.sort();
            unique.dedup();
            unique
        };
        self
    }

    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.frame = frame;
        self
    }

    pub fn method(&self) -> FitMethod {
        self.method
    }

    pub fn frame(&self) -> Frame {
        self.frame
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    /// Summarize the recorder's contents with `delay` as the fit timescale.
    ///
    /// Fails with [`Error::InsufficientData`] when the buffer is too short
    /// for the method or a tracked landmark was never visible.
    pub fn summarize(&self, recorder: &Recorder, delay: f64) -> Result<Summary> {
        let t = match recorder.last() {
            Some(sample) => sample.t,
            None => return Err(Error::InsufficientData("recorder is empty".to_string())),
        };

        let mut summary = Summary {
            t,
            ..Summary::default()
        };

        match self.method {
            FitMethod::Regression => {
                // Timestamps are shared by every channel; extract them once.
                let times = recorder.times(None);
                for &landmark in &self.landmarks {
                    let lm = [landmark];
                    let v = recorder.list(&lm, Channel::Visibility, self.frame, None);
                    let fit = |channel| -> Result<Fit> {
                        let x = recorder.list(&lm, channel, self.frame, None);
                        weighted_fit(&times, &v, &x, delay)
                    };
                    let (fx, fy, fz) = (fit(Channel::X)?, fit(Channel::Y)?, fit(Channel::Z)?);
                    summary.insert(landmark, fx, fy, fz);
                }
            }
            FitMethod::Difference => {
                for &landmark in &self.landmarks {
                    let lm = [landmark];
                    let fx = recorder.diff(&lm, Channel::X, self.frame)?;
                    let fy = recorder.diff(&lm, Channel::Y, self.frame)?;
                    let fz = recorder.diff(&lm, Channel::Z, self.frame)?;
                    summary.insert(landmark, fx, fy, fz);
                }
            }
        }

        Ok(summary)
    }
}

impl Summary {
    fn insert(&mut self, landmark: Landmark, x: Fit, y: Fit, z: Fit) {
        self.pos
            .insert(landmark, Vector3::new(x.mean, y.mean, z.mean));
        self.vel
            .insert(landmark, Vector3::new(x.slope, y.slope, z.slope));
    }
}
