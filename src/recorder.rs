//! Fixed-capacity sample store.
//!
//! The recorder keeps the most recent samples of the landmark stream in a
//! circular buffer and extracts per-landmark scalar channels from them:
//! - O(1) push, evicting exactly the oldest sample once full
//! - Chronological (oldest to newest) iteration and extraction
//! - A rolling count of samples in which the reference landmarks are visible
//!
//! Design note: Positions can be reported relative to a reference point (the
//! midpoint of the heels by default). That only makes sense while the
//! reference is reliably visible, so centering switches on when at least
//! `reference_ratio` of the buffered samples see it. The count is maintained
//! incrementally on push and eviction; there is no rescan.

use serde::{Deserialize, Serialize};

use crate::fit::{weighted_fit, Fit};
use crate::types::{Channel, Frame, Landmark, Sample};
use crate::{Error, Result};

/// Parameters for the sample store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Number of samples kept. Values below 1 are raised to 1.
    /// Typical: 30 (one second at estimator cadence).
    pub capacity: usize,

    /// The two landmarks whose midpoint is the reference origin.
    pub reference: [Landmark; 2],

    /// Minimum visibility for a reference landmark to count as seen.
    /// Range: [0.0, 1.0]. Typical: 0.5.
    pub reference_min_visibility: f32,

    /// Fraction of buffered samples that must see both reference landmarks
    /// before positions are centred on them. Range: (0.0, 1.0]. Typical: 0.9.
    pub reference_ratio: f32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            capacity: 30,
            reference: [Landmark::LeftHeel, Landmark::RightHeel],
            reference_min_visibility: 0.5,
            reference_ratio: 0.9,
        }
    }
}

/// Circular buffer of the most recent samples.
#[derive(Debug, Clone)]
pub struct Recorder {
    buffer: Vec<Sample>,
    /// Slot holding the oldest sample once the buffer has wrapped.
    start: usize,
    capacity: usize,
    config: RecorderConfig,
    /// Buffered samples in which both reference landmarks are visible.
    reference_visible: usize,
    /// Total samples ever pushed.
    total_pushed: u64,
}

impl Recorder {
    /// Create an empty recorder.
    pub fn new(config: RecorderConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            buffer: Vec::with_capacity(capacity),
            start: 0,
            capacity,
            config,
            reference_visible: 0,
            total_pushed: 0,
        }
    }

    /// Create an empty recorder with default settings and the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(RecorderConfig {
            capacity,
            ..RecorderConfig::default()
        })
    }

    /// Append a sample, evicting the oldest one if the buffer is full.
    pub fn push(&mut self, sample: Sample) {
        let visible = self.sees_reference(&sample);

        if self.buffer.len() < self.capacity {
            self.buffer.push(sample);
        } else {
            let evicted = std::mem::replace(&mut self.buffer[self.start], sample);
            if self.sees_reference(&evicted) {
                self.reference_visible -= 1;
            }
            self.start = (self.start + 1) % self.capacity;
        }

        if visible {
            self.reference_visible += 1;
        }
        self.total_pushed += 1;
    }

    /// The most recently pushed sample.
    pub fn last(&self) -> Option<&Sample> {
        if self.buffer.is_empty() {
            return None;
        }
        let newest = (self.start + self.buffer.len() - 1) % self.buffer.len();
        self.buffer.get(newest)
    }

    /// Buffered samples, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Sample> + '_ {
        let len = self.buffer.len();
        (0..len).map(move |i| &self.buffer[(self.start + i) % len])
    }

    /// The newest `tail` samples (all of them when `None`), oldest first.
    pub fn window(&self, tail: Option<usize>) -> impl Iterator<Item = &Sample> + '_ {
        let len = self.buffer.len();
        let skip = tail.map_or(0, |n| len.saturating_sub(n));
        self.iter().skip(skip)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Total samples pushed since creation or the last [`Recorder::clear`].
    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }

    /// Drop every buffered sample.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.start = 0;
        self.reference_visible = 0;
        self.total_pushed = 0;
    }

    /// Number of buffered samples in which both reference landmarks are visible.
    pub fn reference_visible_count(&self) -> usize {
        self.reference_visible
    }

    /// Whether spatial channels are currently centred on the reference midpoint.
    pub fn reference_enabled(&self) -> bool {
        if self.buffer.is_empty() {
            return false;
        }
        self.reference_visible as f64
            >= f64::from(self.config.reference_ratio) * self.buffer.len() as f64
    }

    fn sees_reference(&self, sample: &Sample) -> bool {
        // Visibility is judged in the world frame; both frames come from the
        // same detection and carry the same scores.
        self.config.reference.iter().all(|&landmark| {
            sample.point(Frame::World, landmark).confidence() >= self.config.reference_min_visibility
        })
    }

    /// Timestamps of the newest `tail` samples, oldest first, at full precision.
    pub fn times(&self, tail: Option<usize>) -> Vec<f64> {
        self.window(tail).map(|sample| sample.t).collect()
    }

    /// Extract one scalar channel, oldest first.
    ///
    /// With several landmarks each value is their mean (their minimum for
    /// [`Channel::Visibility`]). Spatial channels are centred on the reference
    /// midpoint while [`Recorder::reference_enabled`] holds, and the vertical
    /// channel is negated in the world frame so that up is positive.
    pub fn list(
        &self,
        landmarks: &[Landmark],
        channel: Channel,
        frame: Frame,
        tail: Option<usize>,
    ) -> Vec<f32> {
        let centred = channel.is_spatial() && self.reference_enabled();
        self.window(tail)
            .map(|sample| self.extract(sample, landmarks, channel, frame, centred))
            .collect()
    }

    fn extract(
        &self,
        sample: &Sample,
        landmarks: &[Landmark],
        channel: Channel,
        frame: Frame,
        centred: bool,
    ) -> f32 {
        match channel {
            Channel::T => sample.t as f32,
            Channel::Visibility => landmarks
                .iter()
                .map(|&landmark| sample.point(frame, landmark).confidence())
                .fold(None, |min: Option<f32>, v| Some(min.map_or(v, |m| m.min(v))))
                .unwrap_or(0.0),
            Channel::X | Channel::Y | Channel::Z => {
                if landmarks.is_empty() {
                    return 0.0;
                }
                let axis = |landmark: Landmark| {
                    let point = sample.point(frame, landmark);
                    match channel {
                        Channel::X => point.x,
                        Channel::Y => point.y,
                        _ => point.z,
                    }
                };
                let mut value =
                    landmarks.iter().map(|&l| axis(l)).sum::<f32>() / landmarks.len() as f32;
                if centred {
                    let [a, b] = self.config.reference;
                    value -= (axis(a) + axis(b)) / 2.0;
                }
                if frame == Frame::World && channel == Channel::Y {
                    value = -value;
                }
                value
            }
        }
    }

    /// Exponentially weighted fit of one channel over the whole buffer.
    ///
    /// Fails with [`Error::InsufficientData`] on an empty buffer or when the
    /// landmarks were never visible.
    pub fn fit(
        &self,
        landmarks: &[Landmark],
        channel: Channel,
        delay: f64,
        frame: Frame,
    ) -> Result<Fit> {
        if self.buffer.is_empty() {
            return Err(Error::InsufficientData("recorder is empty".to_string()));
        }
        let t = self.times(None);
        let v = self.list(landmarks, Channel::Visibility, frame, None);
        let x = self.list(landmarks, channel, frame, None);
        weighted_fit(&t, &v, &x, delay)
    }

    /// Two-point finite difference over the newest two samples.
    ///
    /// Ignores visibility. Fails with [`Error::InsufficientData`] with fewer
    /// than two samples or when both share a timestamp.
    pub fn diff(&self, landmarks: &[Landmark], channel: Channel, frame: Frame) -> Result<Fit> {
        if self.buffer.len() < 2 {
            return Err(Error::InsufficientData(format!(
                "difference needs two samples, have {}",
                self.buffer.len()
            )));
        }
        let t = self.times(Some(2));
        let x = self.list(landmarks, channel, frame, Some(2));
        let dt = t[1] - t[0];
        if dt <= 0.0 {
            return Err(Error::InsufficientData(
                "newest two samples share a timestamp".to_string(),
            ));
        }
        Ok(Fit {
            delay: dt,
            mean_t: t[1],
            mean: f64::from(x[1]),
            slope: f64::from(x[1] - x[0]) / dt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LandmarkPoint, LANDMARK_COUNT};

    /// Every landmark at (x, y, z) with the given visibility.
    fn sample(t: f64, x: f32, y: f32, z: f32, visibility: f32) -> Sample {
        let points = vec![LandmarkPoint::new(x, y, z, Some(visibility)); LANDMARK_COUNT];
        Sample::uniform(t, points).unwrap()
    }

    fn hidden_heels(t: f64) -> Sample {
        let mut s = sample(t, 0.0, 0.0, 0.0, 1.0);
        s.world[Landmark::LeftHeel.index()].visibility = Some(0.1);
        s.screen[Landmark::LeftHeel.index()].visibility = Some(0.1);
        s
    }

    #[test]
    fn test_recorder_creation() {
        let recorder = Recorder::with_capacity(4);
        assert_eq!(recorder.len(), 0);
        assert!(recorder.is_empty());
        assert!(recorder.last().is_none());
        assert_eq!(recorder.capacity(), 4);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let mut recorder = Recorder::with_capacity(0);
        recorder.push(sample(0.0, 0.0, 0.0, 0.0, 1.0));
        recorder.push(sample(1.0, 0.0, 0.0, 0.0, 1.0));
        assert_eq!(recorder.len(), 1);
        assert_eq!(recorder.last().map(|s| s.t), Some(1.0));
    }

    #[test]
    fn test_holds_min_of_pushes_and_capacity() {
        let mut recorder = Recorder::with_capacity(5);
        for i in 0..12 {
            recorder.push(sample(i as f64, i as f32, 0.0, 0.0, 1.0));
            assert_eq!(recorder.len(), (i + 1).min(5));

            let times: Vec<f64> = recorder.iter().map(|s| s.t).collect();
            let first = (i + 1).saturating_sub(5);
            let expected: Vec<f64> = (first..=i).map(|k| k as f64).collect();
            assert_eq!(times, expected, "after push {}", i);
            assert_eq!(recorder.last().map(|s| s.t), Some(i as f64));
        }
        assert_eq!(recorder.total_pushed(), 12);
    }

    #[test]
    fn test_list_tail_and_time_channel() {
        let mut recorder = Recorder::with_capacity(10);
        // Low visibility everywhere keeps reference centering off.
        for i in 0..6 {
            recorder.push(sample(i as f64 * 0.5, i as f32, 0.0, 0.0, 0.3));
        }
        let tail = recorder.list(&[Landmark::Nose], Channel::X, Frame::Screen, Some(3));
        assert_eq!(tail, vec![3.0, 4.0, 5.0]);
        let t = recorder.list(&[], Channel::T, Frame::Screen, Some(2));
        assert_eq!(t, vec![2.0, 2.5]);
        assert_eq!(recorder.times(Some(10)).len(), 6);
    }

    #[test]
    fn test_list_empty_buffer_is_empty() {
        let recorder = Recorder::with_capacity(3);
        assert!(recorder.list(&[Landmark::Nose], Channel::Y, Frame::World, None).is_empty());
        assert!(recorder.times(None).is_empty());
    }

    #[test]
    fn test_world_y_is_flipped_screen_is_not() {
        let mut config = RecorderConfig::default();
        config.reference_ratio = 1.0;
        let mut recorder = Recorder::new(RecorderConfig { capacity: 3, ..config });
        // Heels invisible: no centering, only the sign convention applies.
        recorder.push(hidden_heels(0.0));
        let mut s = hidden_heels(0.1);
        s.world[Landmark::Nose.index()].y = 0.7;
        s.screen[Landmark::Nose.index()].y = 0.7;
        recorder.push(s);

        let world = recorder.list(&[Landmark::Nose], Channel::Y, Frame::World, Some(1));
        let screen = recorder.list(&[Landmark::Nose], Channel::Y, Frame::Screen, Some(1));
        assert_eq!(world, vec![-0.7]);
        assert_eq!(screen, vec![0.7]);
    }

    #[test]
    fn test_reference_centering() {
        let mut recorder = Recorder::with_capacity(4);
        let mut s = sample(0.0, 0.0, 0.0, 0.0, 1.0);
        s.screen[Landmark::LeftHeel.index()].x = 0.4;
        s.screen[Landmark::RightHeel.index()].x = 0.6;
        s.screen[Landmark::Nose.index()].x = 0.55;
        recorder.push(s);

        assert!(recorder.reference_enabled());
        let x = recorder.list(&[Landmark::Nose], Channel::X, Frame::Screen, None);
        assert!((x[0] - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_reference_counter_tracks_evictions() {
        let mut recorder = Recorder::with_capacity(10);
        for i in 0..10 {
            recorder.push(sample(i as f64, 0.0, 0.0, 0.0, 1.0));
        }
        assert_eq!(recorder.reference_visible_count(), 10);
        assert!(recorder.reference_enabled());

        // One hidden sample out of ten still meets the 90% bar.
        recorder.push(hidden_heels(10.0));
        assert_eq!(recorder.reference_visible_count(), 9);
        assert!(recorder.reference_enabled());

        recorder.push(hidden_heels(11.0));
        assert_eq!(recorder.reference_visible_count(), 8);
        assert!(!recorder.reference_enabled());

        // Push enough visible samples to evict both hidden ones.
        for i in 12..22 {
            recorder.push(sample(i as f64, 0.0, 0.0, 0.0, 1.0));
        }
        assert_eq!(recorder.reference_visible_count(), 10);
    }

    #[test]
    fn test_multi_landmark_mean_and_min_visibility() {
        let mut recorder = Recorder::with_capacity(2);
        let mut s = hidden_heels(0.0);
        s.screen[Landmark::LeftHip.index()] = LandmarkPoint::new(0.2, 0.0, 0.0, Some(0.9));
        s.screen[Landmark::RightHip.index()] = LandmarkPoint::new(0.4, 0.0, 0.0, Some(0.6));
        recorder.push(s);

        let hips = [Landmark::LeftHip, Landmark::RightHip];
        let x = recorder.list(&hips, Channel::X, Frame::Screen, None);
        let v = recorder.list(&hips, Channel::Visibility, Frame::Screen, None);
        assert!((x[0] - 0.3).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_fit_on_empty_recorder() {
        let recorder = Recorder::with_capacity(3);
        let err = recorder
            .fit(&[Landmark::Nose], Channel::X, 0.1, Frame::World)
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientData(_)));
    }

    #[test]
    fn test_fit_constant_signal() {
        let mut recorder = Recorder::with_capacity(30);
        for i in 0..30 {
            recorder.push(sample(i as f64 / 30.0, 0.25, 0.0, 0.0, 0.7));
        }
        // Heels share the nose position, so centering leaves a constant.
        let fit = recorder
            .fit(&[Landmark::Nose], Channel::Z, 0.2, Frame::Screen)
            .unwrap();
        assert!(fit.slope.abs() < 1e-9);
    }

    #[test]
    fn test_diff_requires_two_samples() {
        let mut recorder = Recorder::with_capacity(3);
        recorder.push(sample(0.0, 0.0, 0.0, 0.0, 1.0));
        let err = recorder.diff(&[Landmark::Nose], Channel::X, Frame::Screen).unwrap_err();
        assert!(matches!(err, Error::InsufficientData(_)));

        recorder.push(hidden_heels(0.5));
        let mut s = hidden_heels(1.0);
        s.screen[Landmark::Nose.index()].x = 0.5;
        recorder.push(s);
        let fit = recorder.diff(&[Landmark::Nose], Channel::X, Frame::Screen).unwrap();
        assert!((fit.slope - 1.0).abs() < 1e-9);
        assert!((fit.mean - 0.5).abs() < 1e-9);
        assert_eq!(fit.mean_t, 1.0);
    }

    #[test]
    fn test_diff_same_timestamp_is_insufficient() {
        let mut recorder = Recorder::with_capacity(3);
        recorder.push(sample(1.0, 0.0, 0.0, 0.0, 1.0));
        recorder.push(sample(1.0, 1.0, 0.0, 0.0, 1.0));
        assert!(recorder.diff(&[Landmark::Nose], Channel::X, Frame::Screen).is_err());
    }

    #[test]
    fn test_clear_resets_counters() {
        let mut recorder = Recorder::with_capacity(3);
        for i in 0..5 {
            recorder.push(sample(i as f64, 0.0, 0.0, 0.0, 1.0));
        }
        recorder.clear();
        assert!(recorder.is_empty());
        assert_eq!(recorder.reference_visible_count(), 0);
        assert!(!recorder.reference_enabled());
        assert_eq!(recorder.total_pushed(), 0);
    }
}
