//! Line sources: the byte streams the pipeline reads from
//!
//! # Architecture
//!
//! - [`LineSource`] - Capability trait implemented by every transport
//! - [`SourceHandle`] - Shared wrapper the pipeline tasks use; tracks
//!   [`SourceState`] atomically so `is_open()` never waits on a read
//!
//! # Variants
//!
//! - [`SerialLineSource`] - Serial device via the `serialport` crate
//! - [`TcpLineSource`] - TCP fallback: listens, accepts one client, reads it
//! - [`MockLineSource`] - Scripted source for testing (feature-gated)
//!
//! # Ownership
//!
//! Only the connection supervisor opens and closes a source; the reader task
//! only calls [`SourceHandle::read_line`]. Each successful open bumps the
//! handle's generation, and reads made with a stale generation report a
//! disconnect, so a reader left over from before a reconnect can never
//! consume from the reopened handle.

pub mod line_buffer;
#[cfg(feature = "mock-source")]
pub mod mock_source;
pub mod serial;
pub mod tcp;

pub use line_buffer::LineBuffer;
#[cfg(feature = "mock-source")]
pub use mock_source::{MockLineSource, MockSourceProbe, MockStep};
pub use serial::{list_serial_ports, SerialLineSource, SerialPortInfo};
pub use tcp::TcpLineSource;

use crate::config::SourceConfig;
use crate::error::{PortLogError, Result};
use crate::types::SourceState;
use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Unified interface for line-oriented byte sources
///
/// Implementations must be `Send` so the handle can move between the
/// supervisor and reader threads.
pub trait LineSource: Send {
    /// Port name or address, used in messages
    fn identity(&self) -> &str;

    /// Acquire the device or address
    ///
    /// Fails with [`PortLogError::SourceUnavailable`] when it cannot be
    /// acquired (not found, in use, permission denied, no peer).
    fn open(&mut self) -> Result<()>;

    /// Like [`open`](Self::open), but gives up early once `stop` disconnects
    ///
    /// Sources whose open can wait on a peer override this; the default
    /// simply opens.
    fn open_until(&mut self, _stop: &Receiver<()>) -> Result<()> {
        self.open()
    }

    /// Release the device; calling it on a closed source does nothing
    fn close(&mut self);

    /// Whether the source currently holds an open handle
    fn is_open(&self) -> bool;

    /// Read the next complete line, blocking at most the configured timeout
    ///
    /// Fails with [`PortLogError::ReadTimeout`] when no line arrived in time
    /// and with [`PortLogError::SourceDisconnected`] when the handle dropped.
    fn read_line(&mut self) -> Result<String>;

    /// Send one outbound line (a newline is appended)
    fn write_line(&mut self, text: &str) -> Result<()>;
}

/// Build the source a config describes
pub fn from_config(config: &SourceConfig) -> Box<dyn LineSource> {
    match config {
        SourceConfig::Serial(serial) => Box::new(SerialLineSource::new(serial.clone())),
        SourceConfig::Tcp(tcp) => Box::new(TcpLineSource::new(tcp.clone())),
    }
}

/// Shared, state-tracked wrapper around a [`LineSource`]
pub struct SourceHandle {
    identity: String,
    inner: Mutex<Box<dyn LineSource>>,
    state: AtomicU8,
    generation: AtomicU64,
}

impl std::fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceHandle")
            .field("identity", &self.identity)
            .field("state", &self.state())
            .field("generation", &self.generation())
            .finish()
    }
}

impl SourceHandle {
    /// Wrap a closed source
    pub fn new(source: Box<dyn LineSource>) -> Self {
        Self {
            identity: source.identity().to_string(),
            inner: Mutex::new(source),
            state: AtomicU8::new(SourceState::Closed as u8),
            generation: AtomicU64::new(0),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn state(&self) -> SourceState {
        SourceState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Cheap non-blocking open check
    pub fn is_open(&self) -> bool {
        self.state() == SourceState::Open
    }

    /// Number of successful opens so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Open the source, returning the new generation
    ///
    /// On failure the state is left as it was (Closed or Faulted).
    #[cfg(test)]
    pub(crate) fn open(&self) -> Result<u64> {
        self.open_until(&crossbeam_channel::never())
    }

    /// Open the source, abandoning a wait for a peer once `stop` disconnects
    pub(crate) fn open_until(&self, stop: &Receiver<()>) -> Result<u64> {
        let mut inner = self.lock();
        if self.is_open() && inner.is_open() {
            return Ok(self.generation());
        }

        inner.open_until(stop)?;
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.state.store(SourceState::Open as u8, Ordering::Release);
        tracing::info!("Opened {} (generation {})", self.identity, generation);
        Ok(generation)
    }

    /// Close the source; idempotent
    pub(crate) fn close(&self) {
        let mut inner = self.lock();
        inner.close();
        if self.state() != SourceState::Closed {
            tracing::info!("Closed {}", self.identity);
        }
        self.state.store(SourceState::Closed as u8, Ordering::Release);
    }

    /// Record that the given generation dropped
    ///
    /// Returns false when the report is stale (the source was already
    /// reopened or closed since).
    pub(crate) fn mark_faulted(&self, generation: u64) -> bool {
        let mut inner = self.lock();
        if generation != self.generation() || self.state() != SourceState::Open {
            return false;
        }
        inner.close();
        self.state.store(SourceState::Faulted as u8, Ordering::Release);
        true
    }

    /// Read one line on behalf of the reader started for `generation`
    pub fn read_line(&self, generation: u64) -> Result<String> {
        if !self.is_open() || generation != self.generation() {
            return Err(PortLogError::disconnected(&self.identity, "source not open"));
        }

        let mut inner = self.lock();
        // Re-check under the lock; the supervisor may have faulted it meanwhile
        if !self.is_open() || generation != self.generation() {
            return Err(PortLogError::disconnected(&self.identity, "source not open"));
        }
        inner.read_line()
    }

    /// Send an outbound line if the source is open
    pub fn write_line(&self, text: &str) -> Result<()> {
        if !self.is_open() {
            return Err(PortLogError::disconnected(&self.identity, "source not open"));
        }
        self.lock().write_line(text)
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn LineSource>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(all(test, feature = "mock-source"))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn handle_with(source: MockLineSource) -> SourceHandle {
        SourceHandle::new(Box::new(source.with_read_timeout(Duration::from_millis(5))))
    }

    #[test]
    fn test_open_bumps_generation() {
        let handle = handle_with(MockLineSource::new("mock0"));
        assert_eq!(handle.state(), SourceState::Closed);
        assert_eq!(handle.open().unwrap(), 1);
        assert!(handle.is_open());

        // Already open: same generation
        assert_eq!(handle.open().unwrap(), 1);

        handle.close();
        handle.close();
        assert_eq!(handle.state(), SourceState::Closed);
        assert_eq!(handle.open().unwrap(), 2);
    }

    #[test]
    fn test_stale_generation_reads_as_disconnected() {
        let handle = handle_with(MockLineSource::new("mock0").with_lines(["a", "b"]));
        let first = handle.open().unwrap();
        assert_eq!(handle.read_line(first).unwrap(), "a");

        handle.close();
        let second = handle.open().unwrap();
        assert!(matches!(
            handle.read_line(first),
            Err(PortLogError::SourceDisconnected { .. })
        ));
        assert_eq!(handle.read_line(second).unwrap(), "b");
    }

    #[test]
    fn test_mark_faulted_ignores_stale_reports() {
        let handle = handle_with(MockLineSource::new("mock0"));
        let first = handle.open().unwrap();
        assert!(handle.mark_faulted(first));
        assert_eq!(handle.state(), SourceState::Faulted);
        assert!(!handle.mark_faulted(first));

        let second = handle.open().unwrap();
        assert!(!handle.mark_faulted(first));
        assert!(handle.is_open());
        assert!(handle.mark_faulted(second));
    }

    #[test]
    fn test_write_requires_open_source() {
        let source = MockLineSource::new("mock0");
        let probe = source.probe();
        let handle = handle_with(source);

        assert!(handle.write_line("hello").is_err());
        handle.open().unwrap();
        handle.write_line("hello").unwrap();
        assert_eq!(probe.written_lines(), vec!["hello".to_string()]);
    }
}
