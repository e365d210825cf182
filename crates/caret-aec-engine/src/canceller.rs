//! Per-channel echo removal.
//!
//! A [`ChannelCanceller`] owns everything one interleaved channel needs:
//! the render history, the adaptive filter and its divergence detector, the
//! residual suppressor and one high-pass filter per signal path. The engine
//! feeds it one chunk at a time.

use std::collections::TryReserveError;

use crate::adaptive_filter::{AdaptiveFilter, DivergenceDetector};
use crate::common::{MAX_INPUT_MAGNITUDE, MAX_SAMPLE_MAGNITUDE, try_zeroed};
use crate::config::EngineConfig;
use crate::high_pass_filter::HighPassFilter;
use crate::render_history::RenderHistory;
use crate::residual_suppressor::ResidualSuppressor;

/// Messages of each kind a channel may log per session.
const MAX_LOG_MESSAGES: u32 = 5;

/// Per-chunk counters reported back to the engine.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ChunkOutcome {
    pub divergence_resets: u64,
    pub recovered_faults: u64,
    pub capture_energy: f32,
    pub output_energy: f32,
    pub num_samples: usize,
}

impl ChunkOutcome {
    pub(crate) fn accumulate(&mut self, other: &ChunkOutcome) {
        self.divergence_resets += other.divergence_resets;
        self.recovered_faults += other.recovered_faults;
        self.capture_energy += other.capture_energy;
        self.output_energy += other.output_energy;
        self.num_samples += other.num_samples;
    }
}

/// Copies `value` unless it is non-finite or beyond
/// [`MAX_INPUT_MAGNITUDE`], in which case zero is stored and the sample is
/// marked faulty.
fn sanitize(value: f32, fault: &mut bool) -> f32 {
    if value.abs() <= MAX_INPUT_MAGNITUDE {
        value
    } else {
        *fault = true;
        0.0
    }
}

/// Filters `data` in place and zeroes anything the filter pushed out of
/// range, resetting the filter state if that happened.
fn high_pass(filter: &mut HighPassFilter, data: &mut [f32], faults: &mut [bool]) {
    filter.process_in_place(data);
    let mut overflowed = false;
    for (v, fault) in data.iter_mut().zip(faults.iter_mut()) {
        if !v.is_finite() {
            *v = 0.0;
            *fault = true;
            overflowed = true;
        }
    }
    if overflowed {
        filter.reset();
    }
}

pub(crate) struct ChannelCanceller {
    channel: usize,
    history: RenderHistory,
    filter: AdaptiveFilter,
    divergence: DivergenceDetector,
    suppressor: ResidualSuppressor,
    render_high_pass: Option<HighPassFilter>,
    capture_high_pass: Option<HighPassFilter>,
    render: Vec<f32>,
    capture: Vec<f32>,
    faults: Vec<bool>,
    num_frames: usize,
    divergence_log_counter: u32,
    fault_log_counter: u32,
}

impl ChannelCanceller {
    /// `max_lag` is the largest filter alignment the channel will be asked
    /// to use.
    pub(crate) fn new(
        config: &EngineConfig,
        channel: usize,
        sample_rate_hz: usize,
        max_chunk_frames: usize,
        max_lag: usize,
    ) -> Result<Self, TryReserveError> {
        let filter = AdaptiveFilter::new(&config.filter)?;
        let history = RenderHistory::new(max_lag + filter.length())?;

        let high_pass = || {
            Some(HighPassFilter::new(sample_rate_hz))
                .filter(|f| config.high_pass_filter.enabled && f.is_active())
        };

        let mut faults = Vec::new();
        faults.try_reserve_exact(max_chunk_frames)?;
        faults.resize(max_chunk_frames, false);

        Ok(Self {
            channel,
            history,
            filter,
            divergence: DivergenceDetector::new(&config.filter),
            suppressor: ResidualSuppressor::new(&config.suppressor, sample_rate_hz),
            render_high_pass: high_pass(),
            capture_high_pass: high_pass(),
            render: try_zeroed(max_chunk_frames)?,
            capture: try_zeroed(max_chunk_frames)?,
            faults,
            num_frames: 0,
            divergence_log_counter: 0,
            fault_log_counter: 0,
        })
    }

    /// Deinterleaves this channel's samples of one chunk into the working
    /// buffers, replacing non-finite values and applying the high-pass
    /// filters. Channels missing from a trailing partial frame read as zero.
    pub(crate) fn load_chunk(
        &mut self,
        reference: &[f32],
        microphone: &[f32],
        num_channels: usize,
        num_frames: usize,
    ) {
        debug_assert!(num_frames <= self.render.len());
        debug_assert_eq!(reference.len(), microphone.len());
        self.num_frames = num_frames;

        let render = &mut self.render[..num_frames];
        let capture = &mut self.capture[..num_frames];
        let faults = &mut self.faults[..num_frames];
        for (i, ((r, c), fault)) in render
            .iter_mut()
            .zip(capture.iter_mut())
            .zip(faults.iter_mut())
            .enumerate()
        {
            let index = i * num_channels + self.channel;
            *fault = false;
            if index < reference.len() {
                *r = sanitize(reference[index], fault);
                *c = sanitize(microphone[index], fault);
            } else {
                *r = 0.0;
                *c = 0.0;
            }
        }

        if let Some(f) = self.render_high_pass.as_mut() {
            high_pass(f, render, faults);
        }
        if let Some(f) = self.capture_high_pass.as_mut() {
            high_pass(f, capture, faults);
        }
    }

    /// Reference signal of the loaded chunk after conditioning.
    pub(crate) fn render(&self) -> &[f32] {
        &self.render[..self.num_frames]
    }

    /// Microphone signal of the loaded chunk after conditioning.
    pub(crate) fn capture(&self) -> &[f32] {
        &self.capture[..self.num_frames]
    }

    pub(crate) fn shift_filter(&mut self, delta: isize) {
        self.filter.shift(delta);
    }

    /// Removes the echo from the loaded chunk and writes the result into
    /// this channel's positions of the interleaved `output`.
    pub(crate) fn process_chunk(
        &mut self,
        alignment: usize,
        output: &mut [f32],
        num_channels: usize,
    ) -> ChunkOutcome {
        let mut outcome = ChunkOutcome::default();
        let length = self.filter.length();

        for i in 0..self.num_frames {
            let x = self.render[i];
            let y = self.capture[i];
            self.history.push(x);
            let window = self.history.window(alignment, length);
            let (echo, x2) = self.filter.estimate(window);
            let e = y - echo;

            let out = if self.faults[i] {
                outcome.recovered_faults += 1;
                if self.fault_log_counter < MAX_LOG_MESSAGES {
                    tracing::debug!(
                        channel = self.channel,
                        frame = i,
                        "silenced output sample with non-finite or out-of-range input"
                    );
                    self.fault_log_counter += 1;
                }
                0.0
            } else if !e.is_finite() || !x2.is_finite() {
                self.filter.reset();
                self.divergence.reset();
                outcome.divergence_resets += 1;
                outcome.recovered_faults += 1;
                if self.divergence_log_counter < MAX_LOG_MESSAGES {
                    tracing::warn!(
                        channel = self.channel,
                        "non-finite echo estimate; adaptive filter reset"
                    );
                    self.divergence_log_counter += 1;
                }
                0.0
            } else {
                self.filter.adapt(window, e, x2);
                if self.divergence.update(e, y) {
                    self.filter.reset();
                    outcome.divergence_resets += 1;
                    if self.divergence_log_counter < MAX_LOG_MESSAGES {
                        tracing::warn!(
                            channel = self.channel,
                            "adaptive filter diverged; taps reset"
                        );
                        self.divergence_log_counter += 1;
                    }
                }
                outcome.capture_energy += y * y;
                self.suppressor
                    .process(y, e)
                    .clamp(-MAX_SAMPLE_MAGNITUDE, MAX_SAMPLE_MAGNITUDE)
            };

            let index = i * num_channels + self.channel;
            if let Some(slot) = output.get_mut(index) {
                *slot = out;
                outcome.num_samples += 1;
            }
        }

        outcome.output_energy = (0..self.num_frames)
            .filter_map(|i| output.get(i * num_channels + self.channel))
            .map(|v| v * v)
            .sum();
        outcome
    }
}
