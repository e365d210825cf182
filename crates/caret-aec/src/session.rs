//! A single echo cancellation session.
//!
//! A [`Session`] owns all adaptive state for one stream configuration. The
//! state persists across [`Session::process_buffers`] calls and is only
//! discarded when the session is dropped.

use caret_aec_engine::EchoCancellerEngine;

use crate::error::Error;
use crate::settings::SessionSettings;
use crate::stats::EchoCancellerStats;

/// Checks the buffer contract and returns the common length.
fn validate_buffers(reference: &[f32], microphone: &[f32], output: &[f32]) -> Result<usize, Error> {
    let len = reference.len();
    if microphone.len() != len || output.len() != len {
        return Err(Error::BufferLengthMismatch);
    }
    Ok(len)
}

/// Echo cancellation state for one stream.
#[derive(Debug)]
pub struct Session {
    settings: SessionSettings,
    engine: EchoCancellerEngine,
}

impl Session {
    /// Allocates all session state up front.
    pub fn new(settings: &SessionSettings) -> Result<Self, Error> {
        settings.validate()?;
        let engine = EchoCancellerEngine::new(
            settings.engine_config(),
            settings.sample_rate_hz() as usize,
            settings.num_channels() as usize,
            settings.default_delay(),
            settings.audio_buffer_delay(),
        )?;
        Ok(Self {
            settings: settings.clone(),
            engine,
        })
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Removes the echo of `reference` from `microphone` into `output`.
    ///
    /// Buffers are interleaved; sample `i` belongs to channel
    /// `i % num_channels`. All three must have the same length. On success
    /// every output sample has been written and the buffer length is
    /// returned. On error nothing is written.
    pub fn process_buffers(
        &mut self,
        reference: &[f32],
        microphone: &[f32],
        output: &mut [f32],
    ) -> Result<usize, Error> {
        let len = validate_buffers(reference, microphone, output)?;
        if len == 0 {
            return Ok(0);
        }
        Ok(self.engine.process(reference, microphone, output))
    }

    pub fn statistics(&self) -> EchoCancellerStats {
        EchoCancellerStats::from_metrics(self.engine.metrics(), self.settings.sample_rate_hz())
    }
}
