//! Engine configuration.
//!
//! Every field is a tunable, not a prescribed behaviour. [`EngineConfig::validate`]
//! clamps values into the ranges the algorithms are stable in.

/// Configuration for the echo canceller engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub delay: Delay,
    pub filter: Filter,
    pub suppressor: Suppressor,
    pub high_pass_filter: HighPassFilter,
}

impl EngineConfig {
    /// Clamps every parameter into its legal range.
    /// Returns `true` if no changes were needed.
    pub fn validate(&mut self) -> bool {
        let mut ok = true;

        ok &= limit_usize(&mut self.delay.search_half_width, 0, 48_000);
        ok &= limit_usize(&mut self.delay.headroom, 0, 4_096);
        ok &= limit_usize(&mut self.delay.hysteresis, 0, 4_096);
        ok &= limit_f32(&mut self.delay.smoothing, 0.01, 1.0);
        ok &= limit_f32(&mut self.delay.correlation_memory, 0.0, 0.999);
        ok &= limit_f32(&mut self.delay.detection_threshold, 0.0, 1.0);

        ok &= limit_usize(&mut self.filter.length, 1, 16_384);
        ok &= limit_f32(&mut self.filter.step_size, MIN_STEP_SIZE, MAX_STEP_SIZE);
        ok &= limit_f32(&mut self.filter.regularization, 1e-12, 1.0);
        ok &= limit_f32(&mut self.filter.excitation_limit, 0.0, 1.0);
        ok &= limit_usize(&mut self.filter.divergence_window, 16, 480_000);
        ok &= limit_f32(&mut self.filter.divergence_ratio, 1.0, 1_000.0);

        ok &= limit_f32(&mut self.suppressor.threshold, 0.0, 1.0);
        ok &= limit_f32(&mut self.suppressor.min_gain, 0.0, 1.0);
        ok &= limit_f32(&mut self.suppressor.release_rate, 0.0, 1.0);
        ok &= limit_f32(&mut self.suppressor.time_constant_ms, 0.1, 1_000.0);

        ok
    }
}

/// The NLMS convergence bound requires `0 < mu < 2`.
const MIN_STEP_SIZE: f32 = 0.001;
const MAX_STEP_SIZE: f32 = 1.99;

fn limit_f32(value: &mut f32, min: f32, max: f32) -> bool {
    let clamped = value.clamp(min, max);
    let clamped = if clamped.is_finite() { clamped } else { min };
    let unchanged = *value == clamped;
    *value = clamped;
    unchanged
}

fn limit_usize(value: &mut usize, min: usize, max: usize) -> bool {
    let clamped = (*value).clamp(min, max);
    let unchanged = *value == clamped;
    *value = clamped;
    unchanged
}

// --- Sub-config structs ---

/// Delay estimation and filter alignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Delay {
    /// Half-width of the lag search window around the default delay, in frames.
    pub search_half_width: usize,
    /// Frames of history kept in front of the estimated echo onset when
    /// aligning the adaptive filter.
    pub headroom: usize,
    /// Minimum alignment change (frames) before the filter is realigned.
    pub hysteresis: usize,
    /// Weight of a new winning lag in the smoothed estimate.
    pub smoothing: f32,
    /// Per-chunk forgetting factor of the correlation statistics.
    pub correlation_memory: f32,
    /// Minimum normalized correlation for a lag to count as a detection.
    pub detection_threshold: f32,
    pub log_warning_on_delay_changes: bool,
}

impl Default for Delay {
    fn default() -> Self {
        Self {
            search_half_width: 240,
            headroom: 32,
            hysteresis: 8,
            smoothing: 0.3,
            correlation_memory: 0.8,
            detection_threshold: 0.2,
            log_warning_on_delay_changes: false,
        }
    }
}

/// Adaptive filter bank.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Number of taps per channel.
    pub length: usize,
    /// NLMS step size, `0 < mu < 2`.
    pub step_size: f32,
    /// Added to the reference energy in the NLMS normalization.
    pub regularization: f32,
    /// Per-tap RMS of the reference below which the taps are not adapted.
    pub excitation_limit: f32,
    /// Trailing window (frames) over which divergence is evaluated.
    pub divergence_window: usize,
    /// Residual-to-microphone energy ratio above which the taps are reset.
    pub divergence_ratio: f32,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            length: 256,
            step_size: 0.7,
            regularization: 1e-6,
            excitation_limit: 1e-4,
            divergence_window: 1024,
            divergence_ratio: 4.0,
        }
    }
}

/// Nonlinear residual echo suppressor.
#[derive(Debug, Clone, PartialEq)]
pub struct Suppressor {
    pub enabled: bool,
    /// Residual-to-microphone energy ratio below which attenuation starts.
    pub threshold: f32,
    /// Lowest gain the suppressor may apply.
    pub min_gain: f32,
    /// Maximum gain increase per frame.
    pub release_rate: f32,
    /// Time constant of the energy trackers.
    pub time_constant_ms: f32,
}

impl Default for Suppressor {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.1,
            min_gain: 0.1,
            release_rate: 0.002,
            time_constant_ms: 5.0,
        }
    }
}

/// DC / low-frequency rejection on both signal paths.
#[derive(Debug, Clone, PartialEq)]
pub struct HighPassFilter {
    pub enabled: bool,
}

impl Default for HighPassFilter {
    fn default() -> Self {
        Self { enabled: true }
    }
}
