//! Connection supervisor
//!
//! Owns the source lifecycle. Its loop wakes on a disconnect report from the
//! reader, on the stop signal or every poll interval, and checks whether the
//! source is open. If it is not, it runs a reconnect episode: retry `open()`
//! with a backoff between attempts until it succeeds or the pipeline stops,
//! then start a fresh reader on the reopened handle.
//!
//! # State machine
//!
//! ```text
//! Idle -> Checking -> Idle
//!                  -> Reconnecting -> Idle
//! ```
//!
//! Only one episode runs at a time. [`ConnectionSupervisor::reconnect`] can be
//! called from any thread; a caller that finds an episode already in flight
//! gets [`ReconnectOutcome::AlreadyInProgress`] instead of starting another.
//! Episodes never give up on their own.

use super::events::{EventSink, PipelineEvent};
use super::handoff::HandoffSender;
use super::reader::{ReaderExit, ReaderTask};
use super::signal::ShutdownSignal;
use super::stats::PipelineCounters;
use crate::config::SupervisorConfig;
use crate::error::{PortLogError, Result};
use crate::source::SourceHandle;
use crate::types::{ConnectionStatus, SupervisorPhase};
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

/// Result of a [`ConnectionSupervisor::reconnect`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// This call ran the episode and reopened the source
    Reconnected { attempts: u32 },
    /// Another episode was already running
    AlreadyInProgress,
    /// The source was already open
    NotNeeded,
    /// The pipeline stopped before the source reopened
    Cancelled,
}

struct SupervisorShared {
    source: Arc<SourceHandle>,
    config: SupervisorConfig,
    signal: ShutdownSignal,
    events: EventSink,
    counters: Arc<PipelineCounters>,
    phase: AtomicU8,
    reconnecting: AtomicBool,
    disconnect_tx: Sender<u64>,
    disconnect_rx: Receiver<u64>,
    handoff: Mutex<Option<HandoffSender>>,
    reader: Mutex<Option<JoinHandle<ReaderExit>>>,
}

/// Handle to the supervisor; clones share one state machine
#[derive(Clone)]
pub struct ConnectionSupervisor {
    shared: Arc<SupervisorShared>,
}

impl std::fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("source", &self.shared.source)
            .field("phase", &self.phase())
            .finish()
    }
}

/// Clears the in-flight flag when an episode ends, however it ends
struct EpisodeGuard<'a> {
    shared: &'a SupervisorShared,
}

impl Drop for EpisodeGuard<'_> {
    fn drop(&mut self) {
        self.shared
            .phase
            .store(SupervisorPhase::Idle as u8, Ordering::SeqCst);
        self.shared.reconnecting.store(false, Ordering::SeqCst);
    }
}

impl ConnectionSupervisor {
    pub fn new(
        source: Arc<SourceHandle>,
        config: SupervisorConfig,
        handoff: HandoffSender,
        events: EventSink,
        signal: ShutdownSignal,
        counters: Arc<PipelineCounters>,
    ) -> Self {
        let (disconnect_tx, disconnect_rx) = unbounded();
        Self {
            shared: Arc::new(SupervisorShared {
                source,
                config,
                signal,
                events,
                counters,
                phase: AtomicU8::new(SupervisorPhase::Idle as u8),
                reconnecting: AtomicBool::new(false),
                disconnect_tx,
                disconnect_rx,
                handoff: Mutex::new(Some(handoff)),
                reader: Mutex::new(None),
            }),
        }
    }

    pub fn phase(&self) -> SupervisorPhase {
        SupervisorPhase::from_u8(self.shared.phase.load(Ordering::SeqCst))
    }

    pub fn is_reconnecting(&self) -> bool {
        self.shared.reconnecting.load(Ordering::SeqCst)
    }

    pub fn source(&self) -> &Arc<SourceHandle> {
        &self.shared.source
    }

    /// Initial open; returns the generation to start the reader with
    pub fn connect(&self) -> Result<u64> {
        let shared = &self.shared;
        match shared.source.open_until(shared.signal.stopped()) {
            Ok(generation) => {
                shared.events.status(ConnectionStatus::Connected);
                Ok(generation)
            }
            Err(e) => {
                PipelineCounters::bump(&shared.counters.failed_open_attempts);
                Err(e)
            }
        }
    }

    /// Start a reader for `generation`, retiring the previous one
    pub fn start_reader(&self, generation: u64) -> Result<()> {
        let shared = &self.shared;
        let Some(handoff) = lock(&shared.handoff).clone() else {
            return Err(PortLogError::Channel("handoff closed".to_string()));
        };

        let mut slot = lock(&shared.reader);
        if let Some(previous) = slot.take() {
            // A stale generation makes the old reader exit on its next read
            join_reader(previous);
        }

        let reader = ReaderTask::new(
            Arc::clone(&shared.source),
            generation,
            handoff,
            shared.disconnect_tx.clone(),
            shared.events.clone(),
            shared.signal.clone(),
            Arc::clone(&shared.counters),
        );
        *slot = Some(reader.spawn()?);
        Ok(())
    }

    /// Run the supervisor loop on a dedicated thread
    pub fn spawn(&self) -> Result<JoinHandle<()>> {
        let supervisor = self.clone();
        std::thread::Builder::new()
            .name("supervisor".to_string())
            .spawn(move || supervisor.run())
            .map_err(PortLogError::from)
    }

    /// Poll loop; returns once the pipeline stops
    pub fn run(&self) {
        let shared = &self.shared;
        let poll_interval = shared.config.poll_interval();
        tracing::debug!(
            "Supervisor started on {} (poll {:?}, backoff {:?})",
            shared.source.identity(),
            poll_interval,
            shared.config.reconnect_backoff()
        );

        while shared.signal.is_running() {
            select! {
                recv(shared.disconnect_rx) -> generation => {
                    if let Ok(generation) = generation {
                        self.handle_disconnect(generation);
                    }
                }
                recv(shared.signal.stopped()) -> _ => break,
                default(poll_interval) => {}
            }

            if !shared.signal.is_running() {
                break;
            }
            self.check();
        }

        self.shutdown();
        tracing::debug!("Supervisor stopped");
    }

    fn handle_disconnect(&self, generation: u64) {
        let shared = &self.shared;
        if shared.source.mark_faulted(generation) {
            tracing::warn!("{} disconnected", shared.source.identity());
            shared.events.status(ConnectionStatus::Disconnected);
        }
    }

    /// One Idle → Checking → Idle pass
    fn check(&self) {
        let shared = &self.shared;
        if shared
            .phase
            .compare_exchange(
                SupervisorPhase::Idle as u8,
                SupervisorPhase::Checking as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            // A manually triggered episode is running
            return;
        }

        let open = shared.source.is_open();
        let _ = shared.phase.compare_exchange(
            SupervisorPhase::Checking as u8,
            SupervisorPhase::Idle as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );

        if !open {
            self.reconnect();
        }
    }

    /// Run a reconnect episode unless one is running or none is needed
    ///
    /// Blocks for the whole episode. On success a new reader is running
    /// against the reopened source.
    pub fn reconnect(&self) -> ReconnectOutcome {
        let shared = &self.shared;
        if shared.source.is_open() {
            return ReconnectOutcome::NotNeeded;
        }
        if shared
            .reconnecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Reconnect already in progress");
            return ReconnectOutcome::AlreadyInProgress;
        }
        let _guard = EpisodeGuard { shared };

        // Re-check: an episode may have finished between the two checks above
        if shared.source.is_open() {
            return ReconnectOutcome::NotNeeded;
        }
        if !shared.signal.is_running() {
            return ReconnectOutcome::Cancelled;
        }

        shared
            .phase
            .store(SupervisorPhase::Reconnecting as u8, Ordering::SeqCst);
        PipelineCounters::bump(&shared.counters.reconnect_episodes);
        tracing::info!("Reconnecting to {}", shared.source.identity());
        shared.events.emit(PipelineEvent::ReconnectStarted);
        shared.events.status(ConnectionStatus::Reconnecting);

        let backoff = shared.config.reconnect_backoff();
        let mut attempt: u32 = 0;
        loop {
            if !shared.signal.is_running() {
                return ReconnectOutcome::Cancelled;
            }
            attempt = attempt.saturating_add(1);

            match shared.source.open_until(shared.signal.stopped()) {
                Ok(generation) => {
                    tracing::info!(
                        "Reconnected to {} after {} attempt(s)",
                        shared.source.identity(),
                        attempt
                    );
                    // Announce before the new reader can emit its first line
                    shared.events.emit(PipelineEvent::Reconnected { attempts: attempt });
                    shared.events.status(ConnectionStatus::Connected);

                    if let Err(e) = self.start_reader(generation) {
                        if !shared.signal.is_running() {
                            return ReconnectOutcome::Cancelled;
                        }
                        tracing::error!("Failed to start reader after reconnect: {}", e);
                        shared.events.emit(PipelineEvent::Error(e.to_string()));
                        shared.signal.fail(e);
                        return ReconnectOutcome::Cancelled;
                    }
                    return ReconnectOutcome::Reconnected { attempts: attempt };
                }
                Err(_) if !shared.signal.is_running() => return ReconnectOutcome::Cancelled,
                Err(e) => {
                    PipelineCounters::bump(&shared.counters.failed_open_attempts);
                    tracing::warn!(
                        "Reconnect attempt {} failed: {}; retrying in {:?}",
                        attempt,
                        e,
                        backoff
                    );
                    shared.events.emit(PipelineEvent::ReconnectAttempt {
                        attempt,
                        error: e.to_string(),
                    });
                    if !shared.signal.wait(backoff) {
                        return ReconnectOutcome::Cancelled;
                    }
                }
            }
        }
    }

    /// Join the reader and release the handoff sender; idempotent
    ///
    /// Call after the shutdown signal is triggered.
    pub fn shutdown(&self) {
        let shared = &self.shared;
        if let Some(reader) = lock(&shared.reader).take() {
            join_reader(reader);
        }
        lock(&shared.handoff).take();
    }
}

fn join_reader(handle: JoinHandle<ReaderExit>) {
    match handle.join() {
        Ok(exit) => tracing::debug!("Reader joined: {:?}", exit),
        Err(_) => tracing::error!("Reader thread panicked"),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
