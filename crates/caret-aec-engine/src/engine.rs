//! Echo canceller engine.
//!
//! Splits every call into 10 ms chunks. For each chunk the channels are
//! conditioned, the downmixed signals update the shared delay estimate, the
//! adaptive filters are realigned if the estimate moved far enough, and
//! finally every channel removes its echo.

use std::collections::TryReserveError;

use derive_more::Debug;

use crate::canceller::{ChannelCanceller, ChunkOutcome};
use crate::common::{chunk_frames, try_zeroed};
use crate::config::EngineConfig;
use crate::delay_estimator::{DelayEstimateQuality, DelayEstimator};
use crate::high_pass_filter::is_supported_rate;
use crate::metrics::{EngineMetrics, ErleEstimator};

/// Echo cancellation state for one stream configuration.
#[derive(Debug)]
pub struct EchoCancellerEngine {
    sample_rate_hz: usize,
    num_channels: usize,
    chunk_frames: usize,
    /// Frames between the newest reference sample and the first filter tap.
    alignment: usize,
    #[debug(skip)]
    config: EngineConfig,
    #[debug(skip)]
    delay_estimator: DelayEstimator,
    #[debug(skip)]
    channels: Vec<ChannelCanceller>,
    #[debug(skip)]
    render_downmix: Vec<f32>,
    #[debug(skip)]
    capture_downmix: Vec<f32>,
    #[debug(skip)]
    erle: ErleEstimator,
    divergence_resets: u64,
    recovered_sample_faults: u64,
    processed_samples: u64,
}

impl EchoCancellerEngine {
    /// Creates an engine for interleaved streams of `num_channels` channels.
    ///
    /// `default_delay` and `audio_buffer_delay` are in frames. Both
    /// `sample_rate_hz` and `num_channels` must be non-zero.
    pub fn new(
        config: &EngineConfig,
        sample_rate_hz: usize,
        num_channels: usize,
        default_delay: i32,
        audio_buffer_delay: i32,
    ) -> Result<Self, TryReserveError> {
        debug_assert!(sample_rate_hz > 0);
        debug_assert!(num_channels > 0);
        let num_channels = num_channels.max(1);

        let mut config = config.clone();
        if !config.validate() {
            tracing::warn!("engine configuration out of range; clamped to legal values");
        }
        if config.high_pass_filter.enabled && !is_supported_rate(sample_rate_hz) {
            tracing::debug!(sample_rate_hz, "no high-pass filter for this rate; bypassed");
        }

        let chunk_frames = chunk_frames(sample_rate_hz);
        let delay_estimator =
            DelayEstimator::new(&config.delay, default_delay, audio_buffer_delay, chunk_frames)?;
        let max_lag = *delay_estimator.lag_range().end();

        let mut channels = Vec::new();
        channels.try_reserve_exact(num_channels)?;
        for channel in 0..num_channels {
            channels.push(ChannelCanceller::new(
                &config,
                channel,
                sample_rate_hz,
                chunk_frames,
                max_lag,
            )?);
        }

        let alignment = delay_estimator
            .estimate()
            .delay
            .saturating_sub(config.delay.headroom);

        Ok(Self {
            sample_rate_hz,
            num_channels,
            chunk_frames,
            alignment,
            config,
            delay_estimator,
            channels,
            render_downmix: try_zeroed(chunk_frames)?,
            capture_downmix: try_zeroed(chunk_frames)?,
            erle: ErleEstimator::default(),
            divergence_resets: 0,
            recovered_sample_faults: 0,
            processed_samples: 0,
        })
    }

    pub fn sample_rate_hz(&self) -> usize {
        self.sample_rate_hz
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Removes the echo of `reference` from `microphone` into `output`.
    ///
    /// All three buffers are interleaved and must have the same length.
    /// Every output sample is written and finite. Returns the number of
    /// samples processed.
    pub fn process(&mut self, reference: &[f32], microphone: &[f32], output: &mut [f32]) -> usize {
        debug_assert_eq!(reference.len(), microphone.len());
        debug_assert_eq!(reference.len(), output.len());
        let len = output.len().min(reference.len()).min(microphone.len());
        let chunk_samples = self.chunk_frames * self.num_channels;

        for ((r, m), o) in reference[..len]
            .chunks(chunk_samples)
            .zip(microphone[..len].chunks(chunk_samples))
            .zip(output[..len].chunks_mut(chunk_samples))
        {
            self.process_chunk(r, m, o);
        }
        len
    }

    fn process_chunk(&mut self, reference: &[f32], microphone: &[f32], output: &mut [f32]) {
        let num_frames = reference.len().div_ceil(self.num_channels);

        for channel in &mut self.channels {
            channel.load_chunk(reference, microphone, self.num_channels, num_frames);
        }

        let render = &mut self.render_downmix[..num_frames];
        let capture = &mut self.capture_downmix[..num_frames];
        render.fill(0.0);
        capture.fill(0.0);
        let scale = 1.0 / self.num_channels as f32;
        for channel in &self.channels {
            for (d, &v) in render.iter_mut().zip(channel.render()) {
                *d += scale * v;
            }
            for (d, &v) in capture.iter_mut().zip(channel.capture()) {
                *d += scale * v;
            }
        }

        let estimate = self.delay_estimator.update(render, capture);
        let target = estimate.delay.saturating_sub(self.config.delay.headroom);
        if target.abs_diff(self.alignment) > self.config.delay.hysteresis {
            let delta = target as isize - self.alignment as isize;
            for channel in &mut self.channels {
                channel.shift_filter(delta);
            }
            if self.config.delay.log_warning_on_delay_changes {
                tracing::warn!(
                    delay = estimate.delay,
                    previous_alignment = self.alignment,
                    alignment = target,
                    "echo delay changed; adaptive filters realigned"
                );
            } else {
                tracing::debug!(
                    delay = estimate.delay,
                    previous_alignment = self.alignment,
                    alignment = target,
                    "echo delay changed; adaptive filters realigned"
                );
            }
            self.alignment = target;
        }

        let mut outcome = ChunkOutcome::default();
        for channel in &mut self.channels {
            outcome.accumulate(&channel.process_chunk(self.alignment, output, self.num_channels));
        }

        self.divergence_resets += outcome.divergence_resets;
        self.recovered_sample_faults += outcome.recovered_faults;
        self.processed_samples += outcome.num_samples as u64;
        self.erle.update(
            outcome.capture_energy,
            outcome.output_energy,
            outcome.num_samples,
        );
    }

    pub fn metrics(&self) -> EngineMetrics {
        let estimate = self.delay_estimator.estimate();
        EngineMetrics {
            delay_frames: (estimate.quality == DelayEstimateQuality::Refined)
                .then_some(estimate.delay),
            echo_return_loss_enhancement_db: self.erle.erle_db(),
            divergence_resets: self.divergence_resets,
            recovered_sample_faults: self.recovered_sample_faults,
            processed_samples: self.processed_samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::Debug;

    use super::*;
    use crate::high_pass_filter::HighPassFilter;
    use crate::vector_math::energy;
    use caret_aec_proptest::comparison::assert_samples_near;
    use caret_aec_proptest::generators::{StreamBuffers, non_finite};
    use caret_aec_proptest::signals::{channel, interleave, synthetic_echo, white_noise};
    use test_strategy::proptest;

    /// Mono reference noise and the matching echo `gain * x[n - delay]`.
    fn echo_scenario(len: usize, delay: usize, gain: f32, seed: u32) -> (Vec<f32>, Vec<f32>) {
        let reference = white_noise(seed, len, 1.0);
        let microphone = synthetic_echo(&reference, delay, gain);
        (reference, microphone)
    }

    fn engine(sample_rate_hz: usize, num_channels: usize) -> EchoCancellerEngine {
        EchoCancellerEngine::new(&EngineConfig::default(), sample_rate_hz, num_channels, -5, -10)
            .unwrap()
    }

    /// Runs the scenario in `buffer`-sized calls and returns the output.
    fn run(
        engine: &mut EchoCancellerEngine,
        reference: &[f32],
        microphone: &[f32],
        buffer: usize,
    ) -> Vec<f32> {
        let mut output = vec![0.0f32; reference.len()];
        for ((r, m), o) in reference
            .chunks(buffer)
            .zip(microphone.chunks(buffer))
            .zip(output.chunks_mut(buffer))
        {
            assert_eq!(engine.process(r, m, o), r.len());
        }
        output
    }

    #[test]
    fn converges_on_short_delay() {
        let rate = 16_000;
        let mut e = engine(rate, 1);
        let (reference, microphone) = echo_scenario(4 * rate, 5, 0.5, 11);
        let output = run(&mut e, &reference, &microphone, 160);
        let tail = 3 * rate;
        let ratio = energy(&output[tail..]) / energy(&microphone[tail..]);
        assert!(ratio < 0.01, "residual ratio {ratio}");
        let metrics = e.metrics();
        assert_eq!(metrics.delay_frames, Some(5));
        assert!(metrics.echo_return_loss_enhancement_db.unwrap() > 20.0);
        assert_eq!(metrics.divergence_resets, 0);
        assert_eq!(metrics.processed_samples, reference.len() as u64);
    }

    #[test]
    fn tracks_delay_beyond_headroom() {
        let rate = 16_000;
        let mut e = engine(rate, 1);
        let (reference, microphone) = echo_scenario(5 * rate, 150, 0.4, 5);
        let output = run(&mut e, &reference, &microphone, 480);
        let tail = 4 * rate;
        let ratio = energy(&output[tail..]) / energy(&microphone[tail..]);
        assert!(ratio < 0.01, "residual ratio {ratio}");
        assert_eq!(e.metrics().delay_frames, Some(150));
        // The smoothed estimate may settle anywhere inside the hysteresis band.
        let target = 150 - e.config.delay.headroom;
        assert!(
            e.alignment.abs_diff(target) <= e.config.delay.hysteresis,
            "alignment {} target {target}",
            e.alignment
        );
    }

    #[test]
    fn silence_produces_silence() {
        let mut e = engine(48_000, 1);
        let zeros = vec![0.0f32; 480];
        let mut output = vec![1.0f32; 480];
        assert_eq!(e.process(&zeros, &zeros, &mut output), 480);
        assert!(output.iter().all(|&v| v == 0.0));
        let metrics = e.metrics();
        assert_eq!(metrics.delay_frames, None);
        assert_eq!(metrics.echo_return_loss_enhancement_db, None);
    }

    #[test]
    fn near_end_passes_without_reference() {
        let rate = 16_000;
        let mut e = engine(rate, 1);
        let zeros = vec![0.0f32; rate];
        let speech = white_noise(99, rate, 0.5);
        let output = run(&mut e, &zeros, &speech, 160);
        // Only the high-pass filter acts on the near-end signal.
        let mut expected = speech.clone();
        HighPassFilter::new(rate).process_in_place(&mut expected);
        assert_samples_near(&output, &expected, 1e-6);
    }

    #[test]
    fn recovers_from_non_finite_samples() {
        let rate = 16_000;
        let mut e = engine(rate, 1);
        let (mut reference, mut microphone) = echo_scenario(2 * rate, 5, 0.5, 21);
        reference[1_000] = f32::NAN;
        microphone[2_000] = f32::INFINITY;
        reference[3_000] = f32::NEG_INFINITY;
        microphone[3_000] = f32::NAN;
        let output = run(&mut e, &reference, &microphone, 480);
        assert!(output.iter().all(|v| v.is_finite()));
        assert_eq!(output[1_000], 0.0);
        assert_eq!(output[2_000], 0.0);
        assert_eq!(output[3_000], 0.0);
        assert_eq!(e.metrics().recovered_sample_faults, 3);

        let tail = rate;
        let ratio = energy(&output[tail..]) / energy(&microphone[tail..]);
        assert!(ratio < 0.01, "residual ratio after faults {ratio}");
    }

    #[test]
    fn channels_are_independent() {
        let rate = 16_000;
        let mut e = engine(rate, 2);
        let (left_ref, left_mic) = echo_scenario(3 * rate, 5, 0.5, 1);
        let (right_ref, right_mic) = echo_scenario(3 * rate, 5, 0.3, 2);
        let reference = interleave(&[&left_ref, &right_ref]);
        let microphone = interleave(&[&left_mic, &right_mic]);
        let output = run(&mut e, &reference, &microphone, 960);

        let tail = 2 * rate;
        let left = channel(&output, 2, 0);
        let right = channel(&output, 2, 1);
        let left_ratio = energy(&left[tail..]) / energy(&left_mic[tail..]);
        let right_ratio = energy(&right[tail..]) / energy(&right_mic[tail..]);
        assert!(left_ratio < 0.01, "left residual ratio {left_ratio}");
        assert!(right_ratio < 0.01, "right residual ratio {right_ratio}");
    }

    #[test]
    fn huge_microphone_sample_does_not_stall_tracking() {
        let rate = 16_000;
        let mut e =
            EchoCancellerEngine::new(&EngineConfig::default(), rate, 1, 200, -10).unwrap();
        let (reference, mut microphone) = echo_scenario(5 * rate, 20, 0.5, 13);
        microphone[100] = 1e20;
        let output = run(&mut e, &reference, &microphone, 160);
        assert_eq!(output[100], 0.0);

        let metrics = e.metrics();
        assert_eq!(metrics.delay_frames, Some(20));
        assert_eq!(metrics.recovered_sample_faults, 1);
        let tail = 4 * rate;
        let ratio = energy(&output[tail..]) / energy(&microphone[tail..]);
        assert!(ratio < 0.01, "residual ratio {ratio}");
    }

    #[test]
    fn echo_path_change_resets_and_reconverges() {
        let rate = 16_000;
        let mut e = engine(rate, 1);
        let reference = white_noise(31, 5 * rate, 1.0);
        let loud = synthetic_echo(&reference, 5, 0.9);
        let quiet = synthetic_echo(&reference, 5, 0.02);
        let switch = 2 * rate;
        let microphone: Vec<f32> = loud[..switch]
            .iter()
            .chain(&quiet[switch..])
            .copied()
            .collect();
        let output = run(&mut e, &reference, &microphone, 160);

        assert!(e.metrics().divergence_resets > 0);
        let tail = 4 * rate;
        let ratio = energy(&output[tail..]) / energy(&microphone[tail..]);
        assert!(ratio < 0.01, "residual ratio after echo path change {ratio}");
    }

    #[test]
    fn partial_chunks_and_odd_lengths() {
        let mut e = engine(16_000, 2);
        for len in [0usize, 1, 3, 159, 161, 321, 999] {
            let reference = vec![0.1f32; len];
            let microphone = vec![0.05f32; len];
            let mut output = vec![f32::NAN; len];
            assert_eq!(e.process(&reference, &microphone, &mut output), len);
            assert!(output.iter().all(|v| v.is_finite()), "length {len}");
        }
    }

    #[test]
    fn unsupported_rate_still_cancels() {
        let rate = 44_100;
        let mut e = engine(rate, 1);
        let (reference, microphone) = echo_scenario(3 * rate, 5, 0.5, 8);
        let output = run(&mut e, &reference, &microphone, 441);
        let tail = 2 * rate;
        let ratio = energy(&output[tail..]) / energy(&microphone[tail..]);
        assert!(ratio < 0.01, "residual ratio {ratio}");
    }

    #[test]
    fn invalid_config_is_clamped() {
        let config = EngineConfig {
            filter: crate::config::Filter {
                step_size: 5.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let e = EchoCancellerEngine::new(&config, 16_000, 1, 0, 0).unwrap();
        assert!(e.config.filter.step_size < 2.0);
        assert_eq!(e.sample_rate_hz(), 16_000);
        assert_eq!(e.num_channels(), 1);
    }

    #[test]
    fn debug_output_skips_buffers() {
        let e = engine(16_000, 1);
        let text = format!("{e:?}");
        assert!(text.contains("sample_rate_hz: 16000"));
        assert!(!text.contains("render_downmix"));
    }

    #[proptest]
    fn output_is_bounded_and_finite(buffers: StreamBuffers) {
        let mut e = engine(buffers.sample_rate.hz() as usize, buffers.channels.count());
        let mut output = vec![f32::NAN; buffers.len];
        let n = e.process(&buffers.reference, &buffers.microphone, &mut output);
        assert_eq!(n, buffers.len);
        assert!(output.iter().all(|v| v.is_finite() && v.abs() <= 1.0));
        assert_eq!(e.metrics().processed_samples, buffers.len as u64);
    }

    #[proptest]
    fn single_fault_is_contained(
        buffers: StreamBuffers,
        #[strategy(non_finite())] bad: f32,
        index_seed: usize,
    ) {
        let mut microphone = buffers.microphone.clone();
        let index = (!microphone.is_empty()).then(|| index_seed % microphone.len());
        if let Some(i) = index {
            microphone[i] = bad;
        }
        let mut e = engine(buffers.sample_rate.hz() as usize, buffers.channels.count());
        let mut output = vec![0.0f32; buffers.len];
        e.process(&buffers.reference, &microphone, &mut output);
        assert!(output.iter().all(|v| v.is_finite()));
        if let Some(i) = index {
            assert_eq!(output[i], 0.0);
            assert_eq!(e.metrics().recovered_sample_faults, 1);
        }
    }
}
