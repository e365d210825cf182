//! Session settings.

use caret_aec_engine::EngineConfig;

use crate::error::Error;

/// Default search-window centre, in frames, relative to the bulk delay.
pub const DEFAULT_DELAY: i32 = -5;
/// Default bulk playback-to-capture latency, in frames.
pub const DEFAULT_AUDIO_BUFFER_DELAY: i32 = -10;

/// Parameters of one echo cancellation session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    sample_rate_hz: i32,
    num_channels: i32,
    default_delay: i32,
    audio_buffer_delay: i32,
    engine_config: EngineConfig,
}

impl SessionSettings {
    /// Settings with the default delays and engine configuration.
    pub fn new(sample_rate_hz: i32, num_channels: i32) -> Self {
        Self {
            sample_rate_hz,
            num_channels,
            default_delay: DEFAULT_DELAY,
            audio_buffer_delay: DEFAULT_AUDIO_BUFFER_DELAY,
            engine_config: EngineConfig::default(),
        }
    }

    /// Centre of the delay search window, in frames past the bulk delay.
    pub fn with_default_delay(mut self, frames: i32) -> Self {
        self.default_delay = frames;
        self
    }

    /// Fixed playback-to-capture latency in frames. Negative means none.
    pub fn with_audio_buffer_delay(mut self, frames: i32) -> Self {
        self.audio_buffer_delay = frames;
        self
    }

    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.engine_config = config;
        self
    }

    #[inline]
    pub fn sample_rate_hz(&self) -> i32 {
        self.sample_rate_hz
    }

    #[inline]
    pub fn num_channels(&self) -> i32 {
        self.num_channels
    }

    #[inline]
    pub fn default_delay(&self) -> i32 {
        self.default_delay
    }

    #[inline]
    pub fn audio_buffer_delay(&self) -> i32 {
        self.audio_buffer_delay
    }

    #[inline]
    pub fn engine_config(&self) -> &EngineConfig {
        &self.engine_config
    }

    /// Checks the stream format. Delays are never rejected.
    pub fn validate(&self) -> Result<(), Error> {
        if self.sample_rate_hz <= 0 {
            return Err(Error::BadSampleRate);
        }
        if self.num_channels < 1 {
            return Err(Error::BadNumberChannels);
        }
        Ok(())
    }
}
