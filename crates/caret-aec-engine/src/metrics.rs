//! Running engine metrics.

use crate::common::power_ratio_db;

/// Snapshot of the engine's counters and estimates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineMetrics {
    /// Estimated echo delay in frames. `None` until the delay estimator has
    /// seen correlation evidence.
    pub delay_frames: Option<usize>,
    /// ERLE = 10 log10(P_mic / P_out), smoothed over roughly 200 ms.
    pub echo_return_loss_enhancement_db: Option<f32>,
    /// Number of times an adaptive filter was reset, either after diverging
    /// or after a non-finite echo estimate.
    pub divergence_resets: u64,
    /// Number of output samples silenced because of non-finite or
    /// out-of-range values. A non-finite echo estimate silences its sample,
    /// so it is counted here as well as in `divergence_resets`.
    pub recovered_sample_faults: u64,
    /// Total number of samples written to output buffers.
    pub processed_samples: u64,
}

/// Weight of a new chunk in the smoothed powers.
const ERLE_SMOOTHING: f32 = 0.05;
/// Microphone power below which ERLE is undefined.
const MIN_CAPTURE_POWER: f32 = 1e-10;
const MIN_OUTPUT_POWER: f32 = 1e-12;

#[derive(Debug, Default)]
pub(crate) struct ErleEstimator {
    capture_power: Option<f32>,
    output_power: f32,
}

impl ErleEstimator {
    /// Feeds the energies of one chunk of `num_samples` samples.
    pub(crate) fn update(&mut self, capture_energy: f32, output_energy: f32, num_samples: usize) {
        if num_samples == 0 {
            return;
        }
        let capture = capture_energy / num_samples as f32;
        let output = output_energy / num_samples as f32;
        match self.capture_power.as_mut() {
            Some(power) => {
                *power += ERLE_SMOOTHING * (capture - *power);
                self.output_power += ERLE_SMOOTHING * (output - self.output_power);
            }
            None => {
                self.capture_power = Some(capture);
                self.output_power = output;
            }
        }
    }

    pub(crate) fn erle_db(&self) -> Option<f32> {
        self.capture_power
            .filter(|&p| p >= MIN_CAPTURE_POWER)
            .map(|p| power_ratio_db(p, self.output_power.max(MIN_OUTPUT_POWER)))
    }
}
