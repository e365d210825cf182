//! Echo canceller statistics.

use caret_aec_engine::EngineMetrics;

/// Statistics of one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EchoCancellerStats {
    /// Estimated echo delay in frames.
    pub delay_frames: Option<usize>,
    /// Estimated echo delay in milliseconds.
    pub delay_ms: Option<f32>,
    /// ERLE = 10 log10(P_mic / P_out).
    pub echo_return_loss_enhancement_db: Option<f32>,
    /// Adaptive filter resets after divergence or a non-finite estimate.
    pub divergence_resets: u64,
    /// Output samples replaced by silence. A non-finite echo estimate is
    /// counted here and in `divergence_resets`.
    pub recovered_sample_faults: u64,
    /// Output samples written since the session started.
    pub processed_samples: u64,
}

impl EchoCancellerStats {
    pub(crate) fn from_metrics(metrics: EngineMetrics, sample_rate_hz: i32) -> Self {
        Self {
            delay_frames: metrics.delay_frames,
            delay_ms: metrics
                .delay_frames
                .map(|frames| frames as f32 * 1000.0 / sample_rate_hz as f32),
            echo_return_loss_enhancement_db: metrics.echo_return_loss_enhancement_db,
            divergence_resets: metrics.divergence_resets,
            recovered_sample_faults: metrics.recovered_sample_faults,
            processed_samples: metrics.processed_samples,
        }
    }
}
