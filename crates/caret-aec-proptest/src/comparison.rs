//! Signal comparison utilities.

/// First index where `actual` and `expected` differ by more than
/// `tolerance`, NaN on either side counting as a difference.
pub fn first_mismatch(actual: &[f32], expected: &[f32], tolerance: f32) -> Option<usize> {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    actual
        .iter()
        .zip(expected)
        .position(|(&a, &e)| {
            let diff = (a - e).abs();
            diff > tolerance || diff.is_nan()
        })
}

/// Assert two sample buffers agree within an absolute tolerance.
pub fn assert_samples_near(actual: &[f32], expected: &[f32], tolerance: f32) {
    if let Some(i) = first_mismatch(actual, expected, tolerance) {
        panic!(
            "samples differ at index {i}: actual {} expected {} (tolerance {tolerance})",
            actual[i], expected[i]
        );
    }
}

/// Sum of squares, accumulated in double precision.
pub fn energy(x: &[f32]) -> f64 {
    x.iter().map(|&v| f64::from(v) * f64::from(v)).sum()
}

/// Residual energy relative to the microphone energy.
///
/// Returns 0 when both are silent and infinity when only the microphone is.
pub fn residual_ratio(output: &[f32], microphone: &[f32]) -> f64 {
    let residual = energy(output);
    let reference = energy(microphone);
    if reference == 0.0 {
        if residual == 0.0 { 0.0 } else { f64::INFINITY }
    } else {
        residual / reference
    }
}

/// Assert the residual energy is at most `max_ratio` of the microphone energy.
pub fn assert_attenuated(output: &[f32], microphone: &[f32], max_ratio: f64) {
    let ratio = residual_ratio(output, microphone);
    assert!(
        ratio <= max_ratio,
        "insufficient attenuation: residual ratio {ratio} > {max_ratio}"
    );
}
