//! Reader → writer handoff
//!
//! A bounded crossbeam channel. The reader pushes with a bounded wait and
//! re-checks the running flag between waits, so a slow disk slows the reader
//! down without ever hiding a stop request. The writer blocks on the channel
//! and the stop signal together, so it neither busy-polls nor misses a stop.

use super::signal::ShutdownSignal;
use crate::types::LogLine;
use crossbeam_channel::{bounded, select, Receiver, SendTimeoutError, Sender};
use std::time::Duration;

/// Create a handoff with room for `capacity` lines
///
/// `wait` bounds each blocking push attempt.
pub fn handoff(capacity: usize, wait: Duration) -> (HandoffSender, HandoffReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    (HandoffSender { tx, wait }, HandoffReceiver { rx })
}

/// Producer side, held by the reader (and by the supervisor to hand to new readers)
#[derive(Debug, Clone)]
pub struct HandoffSender {
    tx: Sender<LogLine>,
    wait: Duration,
}

impl HandoffSender {
    /// Queue a line for the writer
    ///
    /// Blocks while the queue is full, in steps of the configured wait.
    /// Gives the line back if the pipeline stopped or the writer is gone.
    pub fn push(&self, line: LogLine, signal: &ShutdownSignal) -> Result<(), LogLine> {
        let mut line = line;
        loop {
            match self.tx.send_timeout(line, self.wait) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(returned)) => {
                    if !signal.is_running() {
                        return Err(returned);
                    }
                    tracing::debug!("Writer is behind, handoff full ({} queued)", self.tx.len());
                    line = returned;
                }
                Err(SendTimeoutError::Disconnected(returned)) => return Err(returned),
            }
        }
    }

    /// Lines currently queued
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

/// Consumer side, owned by the writer
#[derive(Debug)]
pub struct HandoffReceiver {
    rx: Receiver<LogLine>,
}

impl HandoffReceiver {
    /// Wait for the next line while the pipeline runs
    ///
    /// Returns `None` once the pipeline is stopped or every sender is gone.
    pub fn recv(&self, signal: &ShutdownSignal) -> Option<LogLine> {
        if !signal.is_running() {
            return None;
        }
        select! {
            recv(self.rx) -> line => line.ok(),
            recv(signal.stopped()) -> _ => None,
        }
    }

    /// Next line after stop, blocking until the producers have exited
    ///
    /// Returns `None` once every sender is dropped and the queue is empty.
    pub fn recv_remaining(&self) -> Option<LogLine> {
        self.rx.recv().ok()
    }

    /// Take every line queued right now without blocking
    pub fn drain(&self) -> Vec<LogLine> {
        self.rx.try_iter().collect()
    }
}
