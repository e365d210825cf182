//! DC and low-frequency rejection for one signal path of one channel.
//!
//! A cascade of three second-order sections in direct form 1. Coefficient
//! sets exist for 16, 32 and 48 kHz; other rates run unfiltered.

#[derive(Debug, Clone, Copy)]
struct BiQuadCoefficients {
    b: [f32; 3],
    a: [f32; 2],
}

const COEFFICIENTS_16KHZ: [BiQuadCoefficients; 3] = [
    BiQuadCoefficients {
        b: [0.877_353_9, -1.754_683_9, 0.877_353_9],
        a: [-1.881_687_3, 0.888_058_5],
    },
    BiQuadCoefficients {
        b: [1.0, -1.999_810_1, 1.0],
        a: [-1.976_035_4, 0.977_970_9],
    },
    BiQuadCoefficients {
        b: [1.0, -1.999_669_2, 1.0],
        a: [-1.994_265_8, 0.995_486_2],
    },
];

const COEFFICIENTS_32KHZ: [BiQuadCoefficients; 3] = [
    BiQuadCoefficients {
        b: [0.910_205_6, -1.820_404_9, 0.910_205_6],
        a: [-1.940_710_9, 0.942_351_3],
    },
    BiQuadCoefficients {
        b: [1.0, -1.999_952_5, 1.0],
        a: [-1.988_434_6, 0.988_921_3],
    },
    BiQuadCoefficients {
        b: [1.0, -1.999_917_3, 1.0],
        a: [-1.997_434_7, 0.997_740_2],
    },
];

const COEFFICIENTS_48KHZ: [BiQuadCoefficients; 3] = [
    BiQuadCoefficients {
        b: [0.921_379, -1.842_755_2, 0.921_379],
        a: [-1.960_450, 0.961_186_3],
    },
    BiQuadCoefficients {
        b: [1.0, -1.999_979, 1.0],
        a: [-1.992_383_4, 0.992_600_1],
    },
    BiQuadCoefficients {
        b: [1.0, -1.999_963_3, 1.0],
        a: [-1.998_357, 0.998_492_8],
    },
];

fn coefficients_for_rate(sample_rate_hz: usize) -> Option<&'static [BiQuadCoefficients; 3]> {
    match sample_rate_hz {
        16_000 => Some(&COEFFICIENTS_16KHZ),
        32_000 => Some(&COEFFICIENTS_32KHZ),
        48_000 => Some(&COEFFICIENTS_48KHZ),
        _ => None,
    }
}

/// Returns `true` if a high-pass filter is available at this rate.
pub(crate) fn is_supported_rate(sample_rate_hz: usize) -> bool {
    coefficients_for_rate(sample_rate_hz).is_some()
}

#[derive(Debug, Clone)]
struct BiQuad {
    coefficients: BiQuadCoefficients,
    x: [f32; 2],
    y: [f32; 2],
}

impl BiQuad {
    fn process_in_place(&mut self, data: &mut [f32]) {
        let [b0, b1, b2] = self.coefficients.b;
        let [a1, a2] = self.coefficients.a;
        let [mut x0, mut x1] = self.x;
        let [mut y0, mut y1] = self.y;
        for v in data.iter_mut() {
            let input = *v;
            *v = b0 * input + b1 * x0 + b2 * x1 - a1 * y0 - a2 * y1;
            x1 = x0;
            x0 = input;
            y1 = y0;
            y0 = *v;
        }
        self.x = [x0, x1];
        self.y = [y0, y1];
    }
}

#[derive(Debug, Clone)]
pub(crate) struct HighPassFilter {
    sections: Vec<BiQuad>,
}

impl HighPassFilter {
    /// Returns a pass-through filter when the rate has no coefficient set.
    pub(crate) fn new(sample_rate_hz: usize) -> Self {
        let sections = coefficients_for_rate(sample_rate_hz)
            .map(|c| {
                c.iter()
                    .map(|&coefficients| BiQuad {
                        coefficients,
                        x: [0.0; 2],
                        y: [0.0; 2],
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { sections }
    }

    pub(crate) fn is_active(&self) -> bool {
        !self.sections.is_empty()
    }

    /// Filters `data` in place. The input must be finite.
    pub(crate) fn process_in_place(&mut self, data: &mut [f32]) {
        for section in &mut self.sections {
            section.process_in_place(data);
        }
    }

    pub(crate) fn reset(&mut self) {
        for section in &mut self.sections {
            section.x = [0.0; 2];
            section.y = [0.0; 2];
        }
    }
}
