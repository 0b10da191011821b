//! Confidence-weighted exponential regression.
//!
//! This module turns a noisy scalar time series into a smoothed value and
//! velocity:
//! - Exponential kernel that decays continuously into the past
//! - Every sample additionally weighted by its visibility confidence
//! - Single pass over the data, no sliding window
//!
//! Design note: The kernel has half-life-like time constant `delay`. Old
//! samples fade out smoothly instead of falling off a window edge, so the
//! same estimator works whether the buffer holds 5 or 500 samples.
//!
//! Why this matters:
//! Occluded joints report garbage positions with low visibility. Weighting by
//! visibility lets those frames contribute almost nothing, so a momentary
//! occlusion does not register as a sudden jump in velocity.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Result of fitting a line to one scalar channel.
///
/// `mean` is the smoothed value at `mean_t`, and `slope` the velocity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fit {
    /// Kernel time constant used for the fit, in seconds.
    pub delay: f64,
    /// Time the smoothed value refers to (one `delay` before the newest sample).
    pub mean_t: f64,
    /// Weighted mean of the signal.
    pub mean: f64,
    /// Weighted regression slope, in signal units per second.
    pub slope: f64,
}

impl Fit {
    /// Evaluate the fitted line at time `t`.
    pub fn at(&self, t: f64) -> f64 {
        self.mean + self.slope * (t - self.mean_t)
    }
}

/// Fit an exponentially weighted line through `(t[i], x[i])`.
///
/// Weights are `w_i = λ·exp(λ·(t_i − t_end))·v_i` with `λ = 1/delay`.
/// The slope is the weighted covariance of signal and time divided by
/// `delay²`, the variance of the continuous kernel, so `delay` is the natural
/// timescale of the estimate.
///
/// Fails with [`Error::InsufficientData`] when there are no samples or every
/// sample has zero visibility.
pub fn weighted_fit(t: &[f64], v: &[f32], x: &[f32], delay: f64) -> Result<Fit> {
    if t.len() != v.len() || t.len() != x.len() {
        return Err(Error::InvalidArgument(format!(
            "fit inputs differ in length: t={}, v={}, x={}",
            t.len(),
            v.len(),
            x.len()
        )));
    }
    if !(delay.is_finite() && delay > 0.0) {
        return Err(Error::InvalidArgument(format!(
            "fit delay must be positive and finite, got {}",
            delay
        )));
    }
    let end_t = match t.last() {
        Some(&end_t) => end_t,
        None => return Err(Error::InsufficientData("no samples to fit".to_string())),
    };

    let lambda = 1.0 / delay;
    let mean_t = end_t - delay;

    let mut weights = Vec::with_capacity(t.len());
    let mut weight_sum = 0.0;
    let mut weighted_x = 0.0;
    for i in 0..t.len() {
        let visibility = f64::from(v[i]).max(0.0);
        let w = lambda * (lambda * (t[i] - end_t)).exp() * visibility;
        weights.push(w);
        weight_sum += w;
        weighted_x += w * f64::from(x[i]);
    }

    if weight_sum <= 0.0 || !weight_sum.is_finite() {
        return Err(Error::InsufficientData(
            "every sample in the buffer has zero visibility".to_string(),
        ));
    }

    let mean = weighted_x / weight_sum;

    // Second pass for the covariance keeps it numerically centred.
    let mut covariance = 0.0;
    for i in 0..t.len() {
        covariance += weights[i] * (f64::from(x[i]) - mean) * (t[i] - mean_t);
    }
    let slope = covariance / weight_sum / (delay * delay);

    Ok(Fit {
        delay,
        mean_t,
        mean,
        slope,
    })
}
