//! Core data types for the pose coaching engine.
//!
//! This module defines the vocabulary shared by every stage of the
//! classification pipeline: landmark names, per-frame samples, coordinate
//! frames, scalar channels and the small vector type used by summaries.
//!
//! Design principle: Types should make intent obvious. If a concept exists,
//! it gets a type. Landmarks are addressed by name, never by bare index.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Number of landmarks produced by the pose estimator per frame.
pub const LANDMARK_COUNT: usize = 33;

// ============================================================================
// LANDMARKS
// ============================================================================

/// A named anatomical point tracked by the pose estimator.
///
/// The discriminants match the estimator's output order, so a landmark's
/// index into a [`Sample`] array is `landmark as usize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Landmark {
    Nose,
    LeftEyeInner,
    LeftEye,
    LeftEyeOuter,
    RightEyeInner,
    RightEye,
    RightEyeOuter,
    LeftEar,
    RightEar,
    MouthLeft,
    MouthRight,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftPinky,
    RightPinky,
    LeftIndex,
    RightIndex,
    LeftThumb,
    RightThumb,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
    LeftFootIndex,
    RightFootIndex,
}

impl Landmark {
    /// Every landmark in estimator order.
    pub const ALL: [Landmark; LANDMARK_COUNT] = [
        Landmark::Nose,
        Landmark::LeftEyeInner,
        Landmark::LeftEye,
        Landmark::LeftEyeOuter,
        Landmark::RightEyeInner,
        Landmark::RightEye,
        Landmark::RightEyeOuter,
        Landmark::LeftEar,
        Landmark::RightEar,
        Landmark::MouthLeft,
        Landmark::MouthRight,
        Landmark::LeftShoulder,
        Landmark::RightShoulder,
        Landmark::LeftElbow,
        Landmark::RightElbow,
        Landmark::LeftWrist,
        Landmark::RightWrist,
        Landmark::LeftPinky,
        Landmark::RightPinky,
        Landmark::LeftIndex,
        Landmark::RightIndex,
        Landmark::LeftThumb,
        Landmark::RightThumb,
        Landmark::LeftHip,
        Landmark::RightHip,
        Landmark::LeftKnee,
        Landmark::RightKnee,
        Landmark::LeftAnkle,
        Landmark::RightAnkle,
        Landmark::LeftHeel,
        Landmark::RightHeel,
        Landmark::LeftFootIndex,
        Landmark::RightFootIndex,
    ];

    /// Position of this landmark in a sample's landmark array.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Look up a landmark by its array position.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Canonical upper-case name, as used in rule files and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Landmark::Nose => "NOSE",
            Landmark::LeftEyeInner => "LEFT_EYE_INNER",
            Landmark::LeftEye => "LEFT_EYE",
            Landmark::LeftEyeOuter => "LEFT_EYE_OUTER",
            Landmark::RightEyeInner => "RIGHT_EYE_INNER",
            Landmark::RightEye => "RIGHT_EYE",
            Landmark::RightEyeOuter => "RIGHT_EYE_OUTER",
            Landmark::LeftEar => "LEFT_EAR",
            Landmark::RightEar => "RIGHT_EAR",
            Landmark::MouthLeft => "MOUTH_LEFT",
            Landmark::MouthRight => "MOUTH_RIGHT",
            Landmark::LeftShoulder => "LEFT_SHOULDER",
            Landmark::RightShoulder => "RIGHT_SHOULDER",
            Landmark::LeftElbow => "LEFT_ELBOW",
            Landmark::RightElbow => "RIGHT_ELBOW",
            Landmark::LeftWrist => "LEFT_WRIST",
            Landmark::RightWrist => "RIGHT_WRIST",
            Landmark::LeftPinky => "LEFT_PINKY",
            Landmark::RightPinky => "RIGHT_PINKY",
            Landmark::LeftIndex => "LEFT_INDEX",
            Landmark::RightIndex => "RIGHT_INDEX",
            Landmark::LeftThumb => "LEFT_THUMB",
            Landmark::RightThumb => "RIGHT_THUMB",
            Landmark::LeftHip => "LEFT_HIP",
            Landmark::RightHip => "RIGHT_HIP",
            Landmark::LeftKnee => "LEFT_KNEE",
            Landmark::RightKnee => "RIGHT_KNEE",
            Landmark::LeftAnkle => "LEFT_ANKLE",
            Landmark::RightAnkle => "RIGHT_ANKLE",
            Landmark::LeftHeel => "LEFT_HEEL",
            Landmark::RightHeel => "RIGHT_HEEL",
            Landmark::LeftFootIndex => "LEFT_FOOT_INDEX",
            Landmark::RightFootIndex => "RIGHT_FOOT_INDEX",
        }
    }
}

impl std::fmt::Display for Landmark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SAMPLES
// ============================================================================

/// One landmark as reported by the pose estimator.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Estimator confidence in [0, 1] that the point is visible.
    /// Absent means the estimator gave no score; it is treated as 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f32>,
}

impl LandmarkPoint {
    pub fn new(x: f32, y: f32, z: f32, visibility: Option<f32>) -> Self {
        Self { x, y, z, visibility }
    }

    /// Visibility with a missing score read as zero confidence.
    pub fn confidence(&self) -> f32 {
        self.visibility.unwrap_or(0.0)
    }
}

/// Coordinate frame a landmark array is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frame {
    /// Metric 3D coordinates centred on the body. The estimator's y axis
    /// points down; readers flip it so that up is positive.
    #[default]
    World,
    /// Image-normalized 2D coordinates in [0, 1] with relative depth.
    Screen,
}

/// A scalar channel that can be extracted from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    X,
    Y,
    Z,
    /// Sample time in seconds.
    T,
    Visibility,
}

impl Channel {
    /// True for the three spatial axes.
    pub fn is_spatial(&self) -> bool {
        matches!(self, Channel::X | Channel::Y | Channel::Z)
    }
}

/// A single frame of pose-estimator output.
///
/// This is the minimal input contract: a monotonic stream time, a wall-clock
/// stamp and both landmark arrays. It is never modified after being pushed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds since the stream started. Must be non-decreasing.
    pub t: f64,
    /// Wall-clock time in Unix milliseconds.
    #[serde(default)]
    pub timestamp_ms: u64,
    /// Landmarks in the world frame, in estimator order.
    pub world: Vec<LandmarkPoint>,
    /// Landmarks in the screen frame, in estimator order.
    pub screen: Vec<LandmarkPoint>,
}

impl Sample {
    /// Creates a sample, checking that both arrays hold every landmark.
    pub fn new(
        t: f64,
        timestamp_ms: u64,
        world: Vec<LandmarkPoint>,
        screen: Vec<LandmarkPoint>,
    ) -> Result<Self> {
        let sample = Self {
            t,
            timestamp_ms,
            world,
            screen,
        };
        sample.validate()?;
        Ok(sample)
    }

    /// Creates a sample whose world and screen arrays are identical.
    ///
    /// Mostly useful for synthetic streams and tests.
    pub fn uniform(t: f64, points: Vec<LandmarkPoint>) -> Result<Self> {
        Self::new(t, 0, points.clone(), points)
    }

    /// Checks the landmark array lengths and the stream time.
    pub fn validate(&self) -> Result<()> {
        if !self.t.is_finite() {
            return Err(Error::InvalidArgument(format!(
                "sample time must be finite, got {}",
                self.t
            )));
        }
        for (frame, points) in [("world", &self.world), ("screen", &self.screen)] {
            if points.len() != LANDMARK_COUNT {
                return Err(Error::InvalidArgument(format!(
                    "{} landmarks: expected {}, got {}",
                    frame,
                    LANDMARK_COUNT,
                    points.len()
                )));
            }
        }
        Ok(())
    }

    /// The landmark array for a frame.
    pub fn landmarks(&self, frame: Frame) -> &[LandmarkPoint] {
        match frame {
            Frame::World => &self.world,
            Frame::Screen => &self.screen,
        }
    }

    /// A single landmark; a missing entry reads as an invisible origin point.
    pub fn point(&self, frame: Frame, landmark: Landmark) -> LandmarkPoint {
        self.landmarks(frame)
            .get(landmark.index())
            .copied()
            .unwrap_or_default()
    }
}

// ============================================================================
// VECTORS
// ============================================================================

/// A 3D vector of smoothed position or velocity.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn add(&self, other: &Vector3) -> Vector3 {
        Vector3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn sub(&self, other: &Vector3) -> Vector3 {
        Vector3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn scale(&self, factor: f64) -> Vector3 {
        Vector3::new(self.x * factor, self.y * factor, self.z * factor)
    }

    pub fn dot(&self, other: &Vector3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Vector3) -> Vector3 {
        Vector3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Euclidean length.
    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Unsigned angle to another vector in radians; 0 if either is zero.
    pub fn angle(&self, other: &Vector3) -> f64 {
        let denom = self.norm() * other.norm();
        if denom == 0.0 {
            return 0.0;
        }
        (self.dot(other) / denom).clamp(-1.0, 1.0).acos()
    }

    /// Component along one spatial channel; 0 for non-spatial channels.
    pub fn component(&self, channel: Channel) -> f64 {
        match channel {
            Channel::X => self.x,
            Channel::Y => self.y,
            Channel::Z => self.z,
            Channel::T | Channel::Visibility => 0.0,
        }
    }
}

// ============================================================================
// CLASSIFICATION STATUS
// ============================================================================

/// Verdict attached to a classification state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Desired movement, shown to the user.
    Good,
    /// Faulty movement, shown to the user.
    Bad,
    /// Intermediate phase with no verdict of its own.
    #[default]
    #[serde(rename = "none")]
    Neutral,
}

impl Status {
    /// Good and bad verdicts are shown immediately; neutral ones are not.
    pub fn is_verdict(&self) -> bool {
        matches!(self, Status::Good | Status::Bad)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Good => "good",
            Status::Bad => "bad",
            Status::Neutral => "none",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(value: f32) -> Vec<LandmarkPoint> {
        vec![LandmarkPoint::new(value, value, value, Some(1.0)); LANDMARK_COUNT]
    }

    #[test]
    fn test_landmark_index_roundtrip() {
        for (i, landmark) in Landmark::ALL.iter().enumerate() {
            assert_eq!(landmark.index(), i);
            assert_eq!(Landmark::from_index(i), Some(*landmark));
        }
        assert_eq!(Landmark::from_index(LANDMARK_COUNT), None);
        assert_eq!(Landmark::LeftHeel.index(), 29);
    }

    #[test]
    fn test_landmark_serde_name() {
        let json = serde_json::to_string(&Landmark::LeftFootIndex).unwrap();
        assert_eq!(json, "\"LEFT_FOOT_INDEX\"");
        let parsed: Landmark = serde_json::from_str("\"RIGHT_HIP\"").unwrap();
        assert_eq!(parsed, Landmark::RightHip);
        assert_eq!(Landmark::RightHip.to_string(), "RIGHT_HIP");
    }

    #[test]
    fn test_missing_visibility_is_zero_confidence() {
        let point = LandmarkPoint::new(0.0, 0.0, 0.0, None);
        assert_eq!(point.confidence(), 0.0);
        let point = LandmarkPoint::new(0.0, 0.0, 0.0, Some(0.8));
        assert!((point.confidence() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_sample_rejects_short_arrays() {
        let err = Sample::new(0.0, 0, vec![LandmarkPoint::default(); 5], points(0.0));
        assert!(matches!(err, Err(Error::InvalidArgument(_))));
        assert!(Sample::uniform(0.0, points(1.0)).is_ok());
    }

    #[test]
    fn test_sample_point_lookup() {
        let mut world = points(0.0);
        world[Landmark::LeftKnee.index()] = LandmarkPoint::new(1.0, 2.0, 3.0, Some(0.9));
        let sample = Sample::new(1.5, 0, world, points(0.5)).unwrap();

        let knee = sample.point(Frame::World, Landmark::LeftKnee);
        assert_eq!(knee.y, 2.0);
        assert_eq!(sample.point(Frame::Screen, Landmark::LeftKnee).y, 0.5);
    }

    #[test]
    fn test_vector_math() {
        let a = Vector3::new(1.0, 0.0, 0.0);
        let b = Vector3::new(0.0, 1.0, 0.0);
        assert_eq!(a.cross(&b), Vector3::new(0.0, 0.0, 1.0));
        assert!((a.angle(&b) - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert_eq!(a.angle(&Vector3::default()), 0.0);
        assert!((a.add(&b).norm() - 2.0_f64.sqrt()).abs() < 1e-12);
        assert_eq!(a.sub(&b).scale(2.0), Vector3::new(2.0, -2.0, 0.0));
    }

    #[test]
    fn test_status_verdicts() {
        assert!(Status::Good.is_verdict());
        assert!(Status::Bad.is_verdict());
        assert!(!Status::Neutral.is_verdict());
        let parsed: Status = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(parsed, Status::Neutral);
    }
}
