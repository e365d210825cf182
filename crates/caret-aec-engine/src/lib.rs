//! Acoustic echo cancellation engine.
//!
//! Removes the echo of a far-end reference signal from a microphone signal
//! with a per-channel time-domain NLMS filter, aligned by a
//! cross-correlation delay estimator and followed by a residual echo
//! suppressor.

pub(crate) mod adaptive_filter;
pub(crate) mod canceller;
pub(crate) mod common;
pub mod config;
pub(crate) mod delay_estimator;
pub(crate) mod engine;
pub(crate) mod high_pass_filter;
pub(crate) mod metrics;
pub(crate) mod render_history;
pub(crate) mod residual_suppressor;
pub(crate) mod vector_math;

pub use config::EngineConfig;
pub use engine::EchoCancellerEngine;
pub use metrics::EngineMetrics;
