//! Shared running flag with an interruptible wait
//!
//! The flag alone only works for loops that poll it. Blocking waits (the
//! supervisor's poll sleep and backoff, the writer's wait for a line) also
//! select on [`ShutdownSignal::stopped`], a channel whose sender is dropped
//! on trigger, so every wait wakes as soon as the pipeline stops.

use crate::error::PortLogError;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug)]
struct SignalShared {
    running: AtomicBool,
    stop_tx: Mutex<Option<Sender<()>>>,
    failure: Mutex<Option<PortLogError>>,
}

/// Cooperative stop signal shared by every pipeline task
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    shared: Arc<SignalShared>,
    stop_rx: Receiver<()>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = bounded(0);
        Self {
            shared: Arc::new(SignalShared {
                running: AtomicBool::new(true),
                stop_tx: Mutex::new(Some(stop_tx)),
                failure: Mutex::new(None),
            }),
            stop_rx,
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Request a stop; idempotent
    pub fn trigger(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        // Dropping the sender disconnects every clone of the receiver
        if lock(&self.shared.stop_tx).take().is_some() {
            tracing::debug!("Shutdown signalled");
        }
    }

    /// Record a fatal error and stop; only the first error is kept
    pub fn fail(&self, error: PortLogError) {
        {
            let mut failure = lock(&self.shared.failure);
            if failure.is_none() {
                tracing::error!("Pipeline failed: {}", error);
                *failure = Some(error);
            } else {
                tracing::warn!("Further pipeline error after failure: {}", error);
            }
        }
        self.trigger();
    }

    /// Take the recorded fatal error, if any
    pub fn take_failure(&self) -> Option<PortLogError> {
        lock(&self.shared.failure).take()
    }

    pub fn has_failed(&self) -> bool {
        lock(&self.shared.failure).is_some()
    }

    /// Sleep for `timeout` unless stopped first
    ///
    /// Returns `true` if the pipeline is still running afterwards.
    pub fn wait(&self, timeout: Duration) -> bool {
        if !self.is_running() {
            return false;
        }
        match self.stop_rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => self.is_running(),
            _ => false,
        }
    }

    /// Receiver that becomes ready (disconnected) once stopped, for `select!`
    pub fn stopped(&self) -> &Receiver<()> {
        &self.stop_rx
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_wait_times_out_while_running() {
        let signal = ShutdownSignal::new();
        assert!(signal.wait(Duration::from_millis(5)));
        assert!(signal.is_running());
    }

    #[test]
    fn test_trigger_wakes_waiters() {
        let signal = ShutdownSignal::new();
        let waiter = signal.clone();
        let handle = std::thread::spawn(move || {
            let started = Instant::now();
            let still_running = waiter.wait(Duration::from_secs(30));
            (still_running, started.elapsed())
        });

        std::thread::sleep(Duration::from_millis(20));
        signal.trigger();
        signal.trigger();

        let (still_running, elapsed) = handle.join().unwrap();
        assert!(!still_running);
        assert!(elapsed < Duration::from_secs(5));
        assert!(!signal.wait(Duration::from_secs(30)));
    }

    #[test]
    fn test_first_failure_wins() {
        let signal = ShutdownSignal::new();
        signal.fail(PortLogError::SinkSealed("a".into()));
        signal.fail(PortLogError::ConfigInvalid("b".into()));

        assert!(!signal.is_running());
        assert!(signal.has_failed());
        assert!(matches!(
            signal.take_failure(),
            Some(PortLogError::SinkSealed(_))
        ));
        assert!(signal.take_failure().is_none());
    }
}
