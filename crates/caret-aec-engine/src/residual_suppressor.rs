//! Post-filter that attenuates residual echo the linear filter left behind.
//!
//! When the residual is a small fraction of the microphone energy, most of
//! what is left is echo the filter has not modelled yet, so the gain is
//! lowered in proportion. The gain drops immediately and recovers slowly.

use crate::config::Suppressor;

/// Microphone power below which no suppression is applied.
const MIN_CAPTURE_POWER: f32 = 1e-10;

pub(crate) struct ResidualSuppressor {
    enabled: bool,
    threshold: f32,
    min_gain: f32,
    release_rate: f32,
    smoothing: f32,
    capture_power: f32,
    residual_power: f32,
    gain: f32,
}

impl ResidualSuppressor {
    pub(crate) fn new(config: &Suppressor, sample_rate_hz: usize) -> Self {
        let time_constant_frames = config.time_constant_ms * 1e-3 * sample_rate_hz as f32;
        let smoothing = 1.0 - (-1.0 / time_constant_frames.max(1.0)).exp();
        Self {
            enabled: config.enabled,
            threshold: config.threshold,
            min_gain: config.min_gain,
            release_rate: config.release_rate,
            smoothing,
            capture_power: 0.0,
            residual_power: 0.0,
            gain: 1.0,
        }
    }

    #[cfg(test)]
    pub(crate) fn gain(&self) -> f32 {
        self.gain
    }

    /// Applies the current gain to one residual sample.
    pub(crate) fn process(&mut self, capture: f32, residual: f32) -> f32 {
        if !self.enabled {
            return residual;
        }
        self.capture_power += self.smoothing * (capture * capture - self.capture_power);
        self.residual_power += self.smoothing * (residual * residual - self.residual_power);

        let target = if self.capture_power < MIN_CAPTURE_POWER || self.threshold <= 0.0 {
            1.0
        } else {
            let ratio = self.residual_power / self.capture_power;
            if ratio < self.threshold {
                (ratio / self.threshold).max(self.min_gain)
            } else {
                1.0
            }
        };

        self.gain = if target < self.gain {
            target
        } else {
            (self.gain + self.release_rate).min(target)
        };
        residual * self.gain
    }
}
