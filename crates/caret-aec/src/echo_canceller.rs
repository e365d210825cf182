//! Shared echo canceller handle.
//!
//! [`EchoCanceller`] holds at most one active [`Session`] behind a mutex, so
//! a single instance can be shared between the threads that drive the audio
//! callbacks. Buffer processing, initialization and shutdown are mutually
//! exclusive.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::Error;
use crate::session::Session;
use crate::settings::SessionSettings;
use crate::stats::EchoCancellerStats;

/// Lifecycle-managed echo canceller.
///
/// # Usage
///
/// ```
/// use caret_aec::{EchoCanceller, SessionSettings};
///
/// let aec = EchoCanceller::new();
/// aec.initialize(&SessionSettings::new(48_000, 1))?;
///
/// let reference = [0.0f32; 480];
/// let microphone = [0.0f32; 480];
/// let mut output = [0.0f32; 480];
/// assert_eq!(aec.process_buffers(&reference, &microphone, &mut output)?, 480);
///
/// aec.shutdown();
/// # Ok::<(), caret_aec::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct EchoCanceller {
    session: Mutex<Option<Session>>,
}

impl EchoCanceller {
    /// Creates an uninitialized echo canceller.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("echo canceller lock poisoned; continuing with current state");
            PoisonError::into_inner(poisoned)
        })
    }

    /// Starts a new session, discarding any active one first.
    ///
    /// On failure the canceller is left uninitialized.
    pub fn initialize(&self, settings: &SessionSettings) -> Result<(), Error> {
        let mut session = self.lock();
        if session.take().is_some() {
            tracing::debug!("shutting down active session before re-initialization");
        }
        match Session::new(settings) {
            Ok(new_session) => {
                tracing::info!(
                    sample_rate_hz = settings.sample_rate_hz(),
                    num_channels = settings.num_channels(),
                    default_delay = settings.default_delay(),
                    audio_buffer_delay = settings.audio_buffer_delay(),
                    "echo canceller session initialized"
                );
                *session = Some(new_session);
                Ok(())
            }
            Err(err) => {
                tracing::error!(
                    error = %err,
                    sample_rate_hz = settings.sample_rate_hz(),
                    num_channels = settings.num_channels(),
                    "echo canceller initialization failed"
                );
                Err(err)
            }
        }
    }

    /// Ends the active session. Does nothing when uninitialized.
    pub fn shutdown(&self) {
        if self.lock().take().is_some() {
            tracing::debug!("echo canceller session shut down");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().is_some()
    }

    /// See [`Session::process_buffers`].
    pub fn process_buffers(
        &self,
        reference: &[f32],
        microphone: &[f32],
        output: &mut [f32],
    ) -> Result<usize, Error> {
        self.lock()
            .as_mut()
            .ok_or(Error::NotInitialized)?
            .process_buffers(reference, microphone, output)
    }

    /// Statistics of the active session, `None` when uninitialized.
    pub fn statistics(&self) -> Option<EchoCancellerStats> {
        self.lock().as_ref().map(Session::statistics)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::error::ErrorKind;
    use caret_aec_proptest::comparison::assert_attenuated;
    use caret_aec_proptest::generators::StreamBuffers;
    use caret_aec_proptest::signals::{synthetic_echo, white_noise};
    use proptest::prelude::ProptestConfig;
    use test_strategy::proptest;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn handle_is_shareable() {
        assert_send_sync::<EchoCanceller>();
    }

    #[test]
    fn uninitialized_use_fails() {
        let aec = EchoCanceller::new();
        assert!(!aec.is_initialized());
        let mut output = [3.0f32; 4];
        let err = aec.process_buffers(&[0.0; 4], &[0.0; 4], &mut output).unwrap_err();
        assert_eq!(err, Error::NotInitialized);
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert_eq!(output, [3.0; 4]);
        assert!(aec.statistics().is_none());
    }

    #[test]
    fn uninitialized_is_reported_before_mismatch() {
        let aec = EchoCanceller::new();
        let mut output = [0.0f32; 2];
        assert_eq!(
            aec.process_buffers(&[0.0; 4], &[0.0; 3], &mut output),
            Err(Error::NotInitialized)
        );
    }

    #[test]
    fn lifecycle() {
        let aec = EchoCanceller::new();
        aec.initialize(&SessionSettings::new(16_000, 1)).unwrap();
        assert!(aec.is_initialized());
        assert!(aec.statistics().is_some());
        aec.shutdown();
        assert!(!aec.is_initialized());
        let mut output = [0.0f32; 160];
        assert_eq!(
            aec.process_buffers(&[0.0; 160], &[0.0; 160], &mut output),
            Err(Error::NotInitialized)
        );
    }

    #[test]
    fn double_shutdown_is_safe() {
        let aec = EchoCanceller::new();
        aec.shutdown();
        aec.initialize(&SessionSettings::new(16_000, 1)).unwrap();
        aec.shutdown();
        aec.shutdown();
        assert!(!aec.is_initialized());
    }

    #[test]
    fn failed_reinitialize_leaves_uninitialized() {
        let aec = EchoCanceller::new();
        aec.initialize(&SessionSettings::new(16_000, 1)).unwrap();
        let err = aec.initialize(&SessionSettings::new(-1, 1)).unwrap_err();
        assert_eq!(err, Error::BadSampleRate);
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(!aec.is_initialized());
    }

    #[test]
    fn reinitialize_starts_fresh() {
        let rate = 16_000;
        let reference = white_noise(4, rate as usize, 1.0);
        let microphone = synthetic_echo(&reference, 5, 0.5);
        let settings = SessionSettings::new(rate, 1);

        // Train one session, then re-initialize it with the same settings.
        let aec = EchoCanceller::new();
        aec.initialize(&settings).unwrap();
        let mut scratch = vec![0.0f32; reference.len()];
        aec.process_buffers(&reference, &microphone, &mut scratch)
            .unwrap();
        aec.initialize(&settings).unwrap();
        let mut reinitialized = vec![0.0f32; reference.len()];
        aec.process_buffers(&reference, &microphone, &mut reinitialized)
            .unwrap();

        let fresh = EchoCanceller::new();
        fresh.initialize(&settings).unwrap();
        let mut expected = vec![0.0f32; reference.len()];
        fresh
            .process_buffers(&reference, &microphone, &mut expected)
            .unwrap();

        assert_eq!(reinitialized, expected);
        assert_eq!(aec.statistics(), fresh.statistics());
    }

    #[test]
    fn concurrent_callers_are_serialized() {
        let rate = 16_000;
        let aec = Arc::new(EchoCanceller::new());
        aec.initialize(&SessionSettings::new(rate, 1)).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|seed| {
                let aec = Arc::clone(&aec);
                thread::spawn(move || {
                    let reference = white_noise(seed + 1, 160 * 50, 1.0);
                    let microphone = synthetic_echo(&reference, 5, 0.5);
                    let mut output = vec![0.0f32; 160];
                    for (r, m) in reference.chunks(160).zip(microphone.chunks(160)) {
                        assert_eq!(aec.process_buffers(r, m, &mut output), Ok(160));
                        assert!(output.iter().all(|v| v.is_finite()));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let stats = aec.statistics().unwrap();
        assert_eq!(stats.processed_samples, 4 * 160 * 50);
    }

    #[test]
    fn shutdown_races_with_processing() {
        let aec = Arc::new(EchoCanceller::new());
        aec.initialize(&SessionSettings::new(16_000, 1)).unwrap();
        let worker = {
            let aec = Arc::clone(&aec);
            thread::spawn(move || {
                let buffer = [0.1f32; 160];
                let mut output = [0.0f32; 160];
                for _ in 0..200 {
                    match aec.process_buffers(&buffer, &buffer, &mut output) {
                        Ok(n) => assert_eq!(n, 160),
                        Err(err) => assert_eq!(err, Error::NotInitialized),
                    }
                }
            })
        };
        aec.shutdown();
        worker.join().unwrap();
        assert!(!aec.is_initialized());
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let aec = Arc::new(EchoCanceller::new());
        aec.initialize(&SessionSettings::new(16_000, 1)).unwrap();
        let poisoner = {
            let aec = Arc::clone(&aec);
            thread::spawn(move || {
                let _guard = aec.session.lock().unwrap();
                panic!("poison the session lock");
            })
        };
        assert!(poisoner.join().is_err());
        assert!(aec.is_initialized());
        let mut output = [0.0f32; 160];
        assert_eq!(aec.process_buffers(&[0.0; 160], &[0.0; 160], &mut output), Ok(160));
    }

    #[test]
    fn echo_is_removed_through_handle() {
        let rate = 48_000;
        let aec = EchoCanceller::new();
        aec.initialize(&SessionSettings::new(rate, 1)).unwrap();
        let reference = white_noise(12, 2 * rate as usize, 1.0);
        let microphone = synthetic_echo(&reference, 5, 0.5);
        let mut output = vec![0.0f32; reference.len()];
        for ((r, m), o) in reference
            .chunks(480)
            .zip(microphone.chunks(480))
            .zip(output.chunks_mut(480))
        {
            assert_eq!(aec.process_buffers(r, m, o), Ok(480));
        }
        let tail = reference.len() - 9600;
        assert_attenuated(&output[tail..], &microphone[tail..], 0.01);
        let stats = aec.statistics().unwrap();
        assert!(stats.echo_return_loss_enhancement_db.unwrap() > 20.0);
    }

    #[proptest(ProptestConfig::with_cases(32))]
    fn every_valid_stream_returns_full_length(buffers: StreamBuffers) {
        let aec = EchoCanceller::new();
        aec.initialize(&SessionSettings::new(
            buffers.sample_rate.hz(),
            buffers.channels.count() as i32,
        ))
        .unwrap();
        let mut output = vec![0.0f32; buffers.len];
        assert_eq!(
            aec.process_buffers(&buffers.reference, &buffers.microphone, &mut output),
            Ok(buffers.len)
        );
    }
}
