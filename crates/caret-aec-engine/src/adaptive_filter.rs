//! Time-domain NLMS echo path model for one channel.
//!
//! Tap `k` weights the reference sample `alignment + k` frames in the past,
//! where the alignment is owned by the caller and follows the delay
//! estimate. The filter adapts only when the reference carries enough
//! energy for the normalized update to be meaningful.

use std::collections::TryReserveError;

use crate::common::try_zeroed;
use crate::config::Filter;
use crate::vector_math::{filter_and_energy, scaled_accumulate};

pub(crate) struct AdaptiveFilter {
    taps: Vec<f32>,
    step_size: f32,
    regularization: f32,
    /// Minimum window energy for an update.
    x2_threshold: f32,
}

impl AdaptiveFilter {
    pub(crate) fn new(config: &Filter) -> Result<Self, TryReserveError> {
        let length = config.length.max(1);
        Ok(Self {
            taps: try_zeroed(length)?,
            step_size: config.step_size,
            regularization: config.regularization,
            x2_threshold: length as f32 * config.excitation_limit * config.excitation_limit,
        })
    }

    pub(crate) fn length(&self) -> usize {
        self.taps.len()
    }

    #[cfg(test)]
    pub(crate) fn taps(&self) -> &[f32] {
        &self.taps
    }

    #[cfg(test)]
    pub(crate) fn taps_mut(&mut self) -> &mut [f32] {
        &mut self.taps
    }

    /// Echo estimate for `window` along with the window energy.
    pub(crate) fn estimate(&self, window: &[f32]) -> (f32, f32) {
        filter_and_energy(&self.taps, window)
    }

    /// NLMS update: `h += mu * e / (x2 + delta) * x`.
    ///
    /// Returns `false` when the reference was too weak to adapt on.
    pub(crate) fn adapt(&mut self, window: &[f32], error: f32, x2: f32) -> bool {
        if x2 <= self.x2_threshold {
            return false;
        }
        let alpha = self.step_size * error / (x2 + self.regularization);
        scaled_accumulate(alpha, window, &mut self.taps);
        true
    }

    /// Moves the model along with an alignment change of `delta` frames so
    /// each tap keeps weighting the same absolute lag. Taps that fall outside
    /// the new window are dropped, new ones start at zero.
    pub(crate) fn shift(&mut self, delta: isize) {
        let length = self.taps.len();
        let magnitude = delta.unsigned_abs();
        if magnitude >= length {
            self.reset();
            return;
        }
        if delta > 0 {
            self.taps.copy_within(magnitude.., 0);
            self.taps[length - magnitude..].fill(0.0);
        } else if delta < 0 {
            self.taps.copy_within(..length - magnitude, magnitude);
            self.taps[..magnitude].fill(0.0);
        }
    }

    pub(crate) fn reset(&mut self) {
        self.taps.fill(0.0);
    }
}

/// Watches the ratio of residual to microphone energy over a trailing window
/// and flags the filter as diverged when the residual grows far beyond the
/// microphone signal it was supposed to reduce.
pub(crate) struct DivergenceDetector {
    window: usize,
    ratio: f32,
    num_accumulated: usize,
    e2_accumulated: f32,
    y2_accumulated: f32,
}

/// Per-sample residual power a window must exceed before it can be judged.
const MIN_RESIDUAL_POWER: f32 = 1e-8;

impl DivergenceDetector {
    pub(crate) fn new(config: &Filter) -> Self {
        Self {
            window: config.divergence_window.max(1),
            ratio: config.divergence_ratio,
            num_accumulated: 0,
            e2_accumulated: 0.0,
            y2_accumulated: 0.0,
        }
    }

    /// Accumulates one sample. Returns `true` at the end of a window that
    /// showed divergence.
    pub(crate) fn update(&mut self, error: f32, capture: f32) -> bool {
        self.e2_accumulated += error * error;
        self.y2_accumulated += capture * capture;
        self.num_accumulated += 1;
        if self.num_accumulated < self.window {
            return false;
        }

        let diverged = self.e2_accumulated > self.ratio * self.y2_accumulated
            && self.e2_accumulated > self.window as f32 * MIN_RESIDUAL_POWER;
        self.reset();
        diverged
    }

    pub(crate) fn reset(&mut self) {
        self.num_accumulated = 0;
        self.e2_accumulated = 0.0;
        self.y2_accumulated = 0.0;
    }
}
