//! Deterministic test signals.

/// Xorshift32 noise source. Produces the same sequence for the same seed on
/// every platform.
#[derive(Debug, Clone)]
pub struct NoiseSource {
    state: u32,
}

impl NoiseSource {
    /// A zero seed is replaced, xorshift would otherwise stay at zero.
    pub fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { 0x9E37_79B9 } else { seed },
        }
    }

    /// Uniform sample in `[-0.5, 0.5]`.
    pub fn next_sample(&mut self) -> f32 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 17;
        self.state ^= self.state << 5;
        (self.state as f32 / u32::MAX as f32) - 0.5
    }
}

/// `len` samples of white noise with peak magnitude `amplitude / 2`.
pub fn white_noise(seed: u32, len: usize, amplitude: f32) -> Vec<f32> {
    let mut source = NoiseSource::new(seed);
    (0..len).map(|_| amplitude * source.next_sample()).collect()
}

/// Microphone signal containing only `gain * reference[n - delay]`.
pub fn synthetic_echo(reference: &[f32], delay: usize, gain: f32) -> Vec<f32> {
    (0..reference.len())
        .map(|n| n.checked_sub(delay).map_or(0.0, |k| gain * reference[k]))
        .collect()
}

/// Interleaves equal-length channel signals frame by frame.
pub fn interleave(channels: &[&[f32]]) -> Vec<f32> {
    let num_frames = channels.first().map_or(0, |c| c.len());
    debug_assert!(channels.iter().all(|c| c.len() == num_frames));
    let mut out = Vec::with_capacity(num_frames * channels.len());
    for i in 0..num_frames {
        out.extend(channels.iter().map(|c| c[i]));
    }
    out
}

/// Extracts one channel from an interleaved buffer.
pub fn channel(interleaved: &[f32], num_channels: usize, channel: usize) -> Vec<f32> {
    interleaved
        .iter()
        .skip(channel)
        .step_by(num_channels)
        .copied()
        .collect()
}
