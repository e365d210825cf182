//! Circular history of reference (render) samples.
//!
//! Samples are stored newest-first and mirrored into a second copy of the
//! storage, so a window of consecutive past samples starting at any lag is
//! always one contiguous slice: `window(lag, len)[k]` is the sample
//! `lag + k` frames before the newest one.

use std::collections::TryReserveError;

use crate::common::try_zeroed;

pub(crate) struct RenderHistory {
    buffer: Vec<f32>,
    capacity: usize,
    newest: usize,
}

impl RenderHistory {
    pub(crate) fn new(capacity: usize) -> Result<Self, TryReserveError> {
        debug_assert!(capacity > 0);
        Ok(Self {
            buffer: try_zeroed(2 * capacity)?,
            capacity,
            newest: 0,
        })
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends one sample; it becomes lag 0.
    pub(crate) fn push(&mut self, value: f32) {
        self.newest = if self.newest > 0 {
            self.newest - 1
        } else {
            self.capacity - 1
        };
        self.buffer[self.newest] = value;
        self.buffer[self.newest + self.capacity] = value;
    }

    pub(crate) fn extend(&mut self, values: &[f32]) {
        for &v in values {
            self.push(v);
        }
    }

    /// `len` consecutive samples going back in time from `lag`.
    pub(crate) fn window(&self, lag: usize, len: usize) -> &[f32] {
        debug_assert!(lag + len <= self.capacity);
        let mut start = self.newest + lag;
        if start >= self.capacity {
            start -= self.capacity;
        }
        &self.buffer[start..start + len]
    }

    #[cfg(test)]
    pub(crate) fn sample(&self, lag: usize) -> f32 {
        self.window(lag, 1)[0]
    }
}
