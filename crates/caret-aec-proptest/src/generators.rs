//! Stream and buffer generators for property-based testing.
//!
//! Provides both strategy functions (for use with `#[strategy(...)]`) and
//! `Arbitrary`-deriving structs for common echo canceller inputs.

use proptest::prelude::*;
use test_strategy::Arbitrary;

/// A sample rate the canceller is commonly run at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum SampleRate {
    #[weight(1)]
    Hz16000,
    #[weight(1)]
    Hz32000,
    #[weight(1)]
    Hz44100,
    #[weight(1)]
    Hz48000,
}

impl SampleRate {
    pub fn hz(self) -> i32 {
        match self {
            Self::Hz16000 => 16000,
            Self::Hz32000 => 32000,
            Self::Hz44100 => 44100,
            Self::Hz48000 => 48000,
        }
    }

    /// Number of frames in 10 ms at this rate.
    pub fn frame_size(self) -> usize {
        (self.hz() / 100) as usize
    }
}

/// Channel count of an interleaved stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum ChannelCount {
    #[weight(2)]
    Mono,
    #[weight(2)]
    Stereo,
    #[weight(1)]
    Quad,
}

impl ChannelCount {
    pub fn count(self) -> usize {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
            Self::Quad => 4,
        }
    }
}

/// Equal-length interleaved reference and microphone buffers for a stream.
///
/// Lengths cover empty buffers, partial chunks, several chunks and lengths
/// that are not a multiple of the channel count.
#[derive(Debug, Clone, Arbitrary)]
pub struct StreamBuffers {
    pub sample_rate: SampleRate,
    pub channels: ChannelCount,
    #[strategy(0..=3 * #sample_rate.frame_size() * #channels.count())]
    pub len: usize,
    #[strategy(samples(#len))]
    pub reference: Vec<f32>,
    #[strategy(samples(#len))]
    pub microphone: Vec<f32>,
}

/// Generate `len` samples in the nominal range.
pub fn samples(len: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..=1.0f32, len..=len)
}

/// Generate a non-finite sample value.
pub fn non_finite() -> impl Strategy<Value = f32> {
    prop_oneof![Just(f32::NAN), Just(f32::INFINITY), Just(f32::NEG_INFINITY)]
}

/// Generate reference, microphone and output lengths that are not all equal.
pub fn mismatched_lengths(max_len: usize) -> impl Strategy<Value = (usize, usize, usize)> {
    (0..=max_len, 0..=max_len, 0..=max_len)
        .prop_filter("lengths must differ", |&(r, m, o)| !(r == m && m == o))
}

/// Generate a sample rate that cannot be used.
pub fn invalid_sample_rate() -> impl Strategy<Value = i32> {
    i32::MIN..=0
}

/// Generate a channel count that cannot be used.
pub fn invalid_channel_count() -> impl Strategy<Value = i32> {
    i32::MIN..=0
}
