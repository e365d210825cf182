//! Real-time acoustic echo cancellation.
//!
//! Removes the echo of a playback (reference) signal from a captured
//! microphone signal. A [`Session`] owns the adaptive state of one stream;
//! [`EchoCanceller`] wraps at most one session behind a lock with an
//! explicit initialize/shutdown lifecycle.

mod echo_canceller;
mod error;
mod session;
mod settings;
mod stats;

pub use caret_aec_engine::{EngineConfig, config};
pub use echo_canceller::EchoCanceller;
pub use error::{Error, ErrorKind};
pub use session::Session;
pub use settings::{DEFAULT_AUDIO_BUFFER_DELAY, DEFAULT_DELAY, SessionSettings};
pub use stats::EchoCancellerStats;
