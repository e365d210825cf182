//! Error taxonomy.

use std::collections::TryReserveError;

/// Errors returned by echo canceller operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Sample rate is zero or negative.
    BadSampleRate,
    /// Channel count is zero or negative.
    BadNumberChannels,
    /// Session state could not be allocated.
    AllocationFailed,
    /// Buffers were submitted without an initialized session.
    NotInitialized,
    /// Reference, microphone and output buffers differ in length.
    BufferLengthMismatch,
}

/// Broad class of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Reported by initialization; no session state is left behind.
    Configuration,
    /// Reported by buffer processing before any work is done; no state is
    /// mutated.
    Precondition,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadSampleRate | Self::BadNumberChannels | Self::AllocationFailed => {
                ErrorKind::Configuration
            }
            Self::NotInitialized | Self::BufferLengthMismatch => ErrorKind::Precondition,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadSampleRate => write!(f, "bad sample rate"),
            Self::BadNumberChannels => write!(f, "bad number of channels"),
            Self::AllocationFailed => write!(f, "failed to allocate echo canceller state"),
            Self::NotInitialized => write!(f, "echo canceller is not initialized"),
            Self::BufferLengthMismatch => write!(f, "buffer lengths do not match"),
        }
    }
}

impl std::error::Error for Error {}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Self::AllocationFailed
    }
}
