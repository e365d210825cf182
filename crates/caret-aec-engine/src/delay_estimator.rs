//! Coarse alignment between the reference and microphone signals.
//!
//! For every lag in the search window the estimator keeps exponentially
//! forgotten cross-correlation and reference-energy statistics. Once per
//! chunk the lag with the largest normalized correlation magnitude is
//! picked, and the reported estimate moves toward it with an exponential
//! moving average so single noisy chunks cannot make it jump.

use std::collections::TryReserveError;
use std::ops::RangeInclusive;

use crate::common::try_zeroed;
use crate::config::Delay;
use crate::render_history::RenderHistory;
use crate::vector_math::{dot_product, energy};

/// Keeps the normalization finite for silent signals.
const CORRELATION_EPSILON: f32 = 1e-10;

/// Largest lag ever searched, two seconds at 48 kHz.
const MAX_LAG: usize = 96_000;

/// Quality level of a delay estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DelayEstimateQuality {
    /// Seeded from the configured delays, no correlation evidence yet.
    Initial,
    /// Backed by at least one correlation detection.
    Refined,
}

/// Delay estimate with associated metadata.
#[derive(Debug, Clone)]
pub(crate) struct DelayEstimate {
    pub quality: DelayEstimateQuality,
    /// Absolute lag in frames; the microphone lags the reference by this much.
    pub delay: usize,
}

/// Lag search window in absolute frames.
///
/// `audio_buffer_delay` is a bulk latency (negative means none),
/// `default_delay` the window centre relative to it. Only causal lags up to
/// [`MAX_LAG`] are searched.
pub(crate) fn search_window(
    default_delay: i32,
    audio_buffer_delay: i32,
    half_width: usize,
) -> RangeInclusive<usize> {
    let bulk = i64::from(audio_buffer_delay.max(0));
    let centre = bulk + i64::from(default_delay);
    let half_width = half_width as i64;
    let max_lag = MAX_LAG as i64;
    let lo = (centre - half_width).clamp(0, max_lag);
    let hi = (centre + half_width).clamp(lo, max_lag);
    lo as usize..=hi as usize
}

/// Picks the entry with the largest correlation magnitude. Exact ties keep
/// the earliest (smallest) lag.
fn strongest_lag(correlations: impl Iterator<Item = (usize, f32)>) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (lag, c) in correlations {
        let magnitude = c.abs();
        match best {
            Some((_, best_magnitude)) if magnitude <= best_magnitude => {}
            _ => best = Some((lag, magnitude)),
        }
    }
    best
}

pub(crate) struct DelayEstimator {
    history: RenderHistory,
    min_lag: usize,
    max_lag: usize,
    cross_correlation: Vec<f32>,
    render_energy: Vec<f32>,
    capture_energy: f32,
    reversed_capture: Vec<f32>,
    smoothed_delay: f32,
    estimate: DelayEstimate,
    memory: f32,
    smoothing: f32,
    detection_threshold: f32,
}

impl DelayEstimator {
    /// `max_chunk_frames` bounds the length of every [`update`](Self::update).
    pub(crate) fn new(
        config: &Delay,
        default_delay: i32,
        audio_buffer_delay: i32,
        max_chunk_frames: usize,
    ) -> Result<Self, TryReserveError> {
        debug_assert!(max_chunk_frames > 0);
        let window = search_window(default_delay, audio_buffer_delay, config.search_half_width);
        let (min_lag, max_lag) = (*window.start(), *window.end());
        let num_lags = max_lag - min_lag + 1;

        let centre = i64::from(audio_buffer_delay.max(0)) + i64::from(default_delay);
        let initial_delay = centre.clamp(min_lag as i64, max_lag as i64) as usize;

        let mut reversed_capture = Vec::new();
        reversed_capture.try_reserve_exact(max_chunk_frames)?;

        Ok(Self {
            history: RenderHistory::new(max_lag + max_chunk_frames)?,
            min_lag,
            max_lag,
            cross_correlation: try_zeroed(num_lags)?,
            render_energy: try_zeroed(num_lags)?,
            capture_energy: 0.0,
            reversed_capture,
            smoothed_delay: initial_delay as f32,
            estimate: DelayEstimate {
                quality: DelayEstimateQuality::Initial,
                delay: initial_delay,
            },
            memory: config.correlation_memory,
            smoothing: config.smoothing,
            detection_threshold: config.detection_threshold,
        })
    }

    fn reset_statistics(&mut self) {
        self.cross_correlation.fill(0.0);
        self.render_energy.fill(0.0);
        self.capture_energy = 0.0;
    }

    pub(crate) fn lag_range(&self) -> RangeInclusive<usize> {
        self.min_lag..=self.max_lag
    }

    pub(crate) fn estimate(&self) -> &DelayEstimate {
        &self.estimate
    }

    /// Feeds one chunk of downmixed reference and microphone signal.
    pub(crate) fn update(&mut self, render: &[f32], capture: &[f32]) -> &DelayEstimate {
        debug_assert_eq!(render.len(), capture.len());
        let num_frames = capture.len();
        if num_frames == 0 {
            return &self.estimate;
        }
        debug_assert!(num_frames + self.max_lag <= self.history.capacity());

        self.history.extend(render);
        self.reversed_capture.clear();
        self.reversed_capture.extend(capture.iter().rev());

        self.capture_energy = self.memory * self.capture_energy + energy(capture);
        let mut overflowed = !self.capture_energy.is_finite();
        for (k, lag) in (self.min_lag..=self.max_lag).enumerate() {
            let x = self.history.window(lag, num_frames);
            self.cross_correlation[k] =
                self.memory * self.cross_correlation[k] + dot_product(&self.reversed_capture, x);
            self.render_energy[k] = self.memory * self.render_energy[k] + energy(x);
            overflowed |=
                !self.cross_correlation[k].is_finite() || !self.render_energy[k].is_finite();
        }
        if overflowed {
            // Offending render samples stay in the history until they age
            // out, so this can repeat for a few chunks.
            tracing::debug!("delay statistics overflowed; discarded");
            self.reset_statistics();
            return &self.estimate;
        }

        let capture_energy = self.capture_energy;
        let candidate = strongest_lag(
            self.cross_correlation
                .iter()
                .zip(self.render_energy.iter())
                .enumerate()
                .map(|(k, (&c, &r))| {
                    let normalization = (r * capture_energy).sqrt() + CORRELATION_EPSILON;
                    (self.min_lag + k, c / normalization)
                }),
        );

        let detected = candidate
            .filter(|&(_, strength)| strength >= self.detection_threshold && strength > 0.0);
        if let Some((lag, _)) = detected {
            self.smoothed_delay += self.smoothing * (lag as f32 - self.smoothed_delay);
            self.estimate.delay =
                (self.smoothed_delay.round() as usize).clamp(self.min_lag, self.max_lag);
            self.estimate.quality = DelayEstimateQuality::Refined;
        }

        &self.estimate
    }
}
