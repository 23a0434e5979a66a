//! Observer events
//!
//! Events go out over a bounded channel with `try_send`; a display that
//! falls behind loses events (counted in `dropped_events`) but never slows
//! the reader or the writer.

use super::stats::PipelineCounters;
use crate::types::{ConnectionStatus, LogLine};
use crossbeam_channel::{Sender, TrySendError};
use std::sync::Arc;

/// Messages from the pipeline to its observers
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A line was received (emitted before it is persisted)
    Line(LogLine),
    /// Source connection status changed
    ConnectionStatus(ConnectionStatus),
    /// The supervisor began a reconnect episode
    ReconnectStarted,
    /// One open attempt in a reconnect episode failed
    ReconnectAttempt { attempt: u32, error: String },
    /// The source was reopened
    Reconnected { attempts: u32 },
    /// The log was rotated
    Rotated { sealed: String, current: String },
    /// An outbound line could not be written to the source
    OutboundFailed(String),
    /// A fatal or otherwise operator-visible error
    Error(String),
    /// The pipeline finished its stop sequence
    Stopped,
}

/// Cloneable event emitter
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<PipelineEvent>,
    counters: Arc<PipelineCounters>,
}

impl EventSink {
    pub fn new(tx: Sender<PipelineEvent>, counters: Arc<PipelineCounters>) -> Self {
        Self { tx, counters }
    }

    /// Send an event, counting it as dropped if the queue is full
    pub fn emit(&self, event: PipelineEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                PipelineCounters::bump(&self.counters.dropped_events);
            }
            // Nobody is listening
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    pub fn status(&self, status: ConnectionStatus) {
        self.emit(PipelineEvent::ConnectionStatus(status));
    }
}
