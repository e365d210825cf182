//! Constants and helpers shared by the engine components.

use std::collections::TryReserveError;

/// Chunks per second; every call is processed in 10 ms chunks.
pub(crate) const NUM_CHUNKS_PER_SECOND: usize = 100;

/// Largest magnitude an output sample may take.
pub(crate) const MAX_SAMPLE_MAGNITUDE: f32 = 1.0;

/// Largest input magnitude accepted as signal. Anything beyond is treated
/// like a non-finite sample so the energy statistics cannot overflow.
pub(crate) const MAX_INPUT_MAGNITUDE: f32 = 32_768.0;

/// Number of frames in one processing chunk at `sample_rate_hz`.
pub(crate) fn chunk_frames(sample_rate_hz: usize) -> usize {
    (sample_rate_hz / NUM_CHUNKS_PER_SECOND).max(1)
}

/// Allocates a zero-filled vector without aborting on allocation failure.
pub(crate) fn try_zeroed(len: usize) -> Result<Vec<f32>, TryReserveError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)?;
    v.resize(len, 0.0);
    Ok(v)
}

/// Converts a linear power ratio to decibels.
pub(crate) fn power_ratio_db(numerator: f32, denominator: f32) -> f32 {
    10.0 * (numerator / denominator).log10()
}
