//! Writer task
//!
//! The only producer of log entries. Waits on the handoff, stamps each line
//! at append time and writes it through the [`LogSink`]. A failed append is
//! fatal: the writer records the failure on the shutdown signal (stopping
//! the pipeline), counts every line still handed off as discarded until the
//! producers have exited, and never retries.
//!
//! On a clean stop the writer keeps going until the producers have exited
//! and the handoff is empty, so every line already handed off is written.

use super::events::{EventSink, PipelineEvent};
use super::handoff::HandoffReceiver;
use super::signal::ShutdownSignal;
use super::stats::PipelineCounters;
use crate::error::{PortLogError, Result};
use crate::sink::LogSink;
use crate::types::LogLine;
use chrono::Local;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;

pub struct WriterTask {
    sink: Arc<LogSink>,
    handoff: HandoffReceiver,
    events: EventSink,
    signal: ShutdownSignal,
    counters: Arc<PipelineCounters>,
}

impl WriterTask {
    pub fn new(
        sink: Arc<LogSink>,
        handoff: HandoffReceiver,
        events: EventSink,
        signal: ShutdownSignal,
        counters: Arc<PipelineCounters>,
    ) -> Self {
        Self {
            sink,
            handoff,
            events,
            signal,
            counters,
        }
    }

    /// Run on a dedicated thread
    pub fn spawn(self) -> Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("writer".to_string())
            .spawn(move || self.run())
            .map_err(PortLogError::from)
    }

    pub fn run(self) {
        tracing::debug!("Writer started on {}", self.sink.location());

        while let Some(line) = self.handoff.recv(&self.signal) {
            if let Err(e) = self.write(&line) {
                self.fail(e);
                return;
            }
        }

        if self.signal.has_failed() {
            self.discard_remaining();
            return;
        }

        // Clean stop: finish what the reader already handed off
        let mut flushed = 0u64;
        while let Some(line) = self.handoff.recv_remaining() {
            if let Err(e) = self.write(&line) {
                self.fail(e);
                return;
            }
            flushed += 1;
        }
        if flushed > 0 {
            tracing::debug!("Writer flushed {} queued lines at shutdown", flushed);
        }
        tracing::debug!("Writer stopped");
    }

    fn write(&self, line: &LogLine) -> Result<()> {
        self.sink.append(Local::now(), &line.text)?;
        PipelineCounters::bump(&self.counters.lines_written);
        Ok(())
    }

    fn fail(&self, error: PortLogError) {
        self.events.emit(PipelineEvent::Error(error.to_string()));
        self.signal.fail(error);
        self.discard_remaining();
    }

    /// Count everything still handed off until the producers have exited
    ///
    /// Blocking until every sender is dropped means a line pushed after the
    /// failure is counted too.
    fn discard_remaining(&self) {
        let mut discarded = 0u64;
        while self.handoff.recv_remaining().is_some() {
            discarded += 1;
        }
        if discarded > 0 {
            self.counters
                .lines_discarded
                .fetch_add(discarded, Ordering::Relaxed);
            tracing::warn!("Discarded {} queued lines after failure", discarded);
        }
    }
}
