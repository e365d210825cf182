//! Property-based test support for the echo canceller.
//!
//! Provides stream and buffer generators, deterministic test signals with a
//! known echo path, and energy comparison helpers.
//!
//! # Usage
//!
//! ```ignore
//! use caret_aec_proptest::generators::*;
//! use test_strategy::proptest;
//!
//! #[proptest]
//! fn my_test(buffers: StreamBuffers) {
//!     assert_eq!(buffers.reference.len(), buffers.microphone.len());
//! }
//! ```

pub mod comparison;
pub mod generators;
pub mod signals;

pub use proptest;
pub use test_strategy;
