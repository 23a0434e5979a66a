//! Reader task
//!
//! Pulls lines from the source for one generation of the handle, echoes each
//! to observers and hands it to the writer. A disconnect is reported to the
//! supervisor and ends the task; the supervisor starts a fresh reader once
//! the source is reopened. The reader never opens or closes the source.

use super::events::{EventSink, PipelineEvent};
use super::handoff::HandoffSender;
use super::signal::ShutdownSignal;
use super::stats::PipelineCounters;
use crate::error::{PortLogError, Result};
use crate::source::SourceHandle;
use crate::types::LogLine;
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Why a reader exited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    /// The pipeline is stopping
    Stopped,
    /// The source dropped; reported to the supervisor
    Disconnected,
    /// The writer is gone
    HandoffClosed,
}

/// Read loop bound to one source generation
pub struct ReaderTask {
    source: Arc<SourceHandle>,
    generation: u64,
    handoff: HandoffSender,
    disconnects: Sender<u64>,
    events: EventSink,
    signal: ShutdownSignal,
    counters: Arc<PipelineCounters>,
}

impl ReaderTask {
    pub fn new(
        source: Arc<SourceHandle>,
        generation: u64,
        handoff: HandoffSender,
        disconnects: Sender<u64>,
        events: EventSink,
        signal: ShutdownSignal,
        counters: Arc<PipelineCounters>,
    ) -> Self {
        Self {
            source,
            generation,
            handoff,
            disconnects,
            events,
            signal,
            counters,
        }
    }

    /// Run on a dedicated thread
    pub fn spawn(self) -> Result<JoinHandle<ReaderExit>> {
        std::thread::Builder::new()
            .name(format!("reader-{}", self.generation))
            .spawn(move || self.run())
            .map_err(PortLogError::from)
    }

    /// Run the read loop until stop, disconnect or writer exit
    pub fn run(self) -> ReaderExit {
        tracing::debug!(
            "Reader started on {} (generation {})",
            self.source.identity(),
            self.generation
        );

        let exit = self.read_loop();

        tracing::debug!(
            "Reader for generation {} exited: {:?}",
            self.generation,
            exit
        );
        exit
    }

    fn read_loop(&self) -> ReaderExit {
        while self.signal.is_running() {
            match self.source.read_line(self.generation) {
                Ok(text) => {
                    PipelineCounters::bump(&self.counters.lines_read);
                    let line = LogLine::now(text);
                    self.events.emit(PipelineEvent::Line(line.clone()));

                    if let Err(line) = self.handoff.push(line, &self.signal) {
                        PipelineCounters::bump(&self.counters.lines_discarded);
                        tracing::warn!("Discarded line at shutdown: {:?}", line.text);
                        return if self.signal.is_running() {
                            ReaderExit::HandoffClosed
                        } else {
                            ReaderExit::Stopped
                        };
                    }
                }
                Err(PortLogError::ReadTimeout) => continue,
                Err(e) => {
                    if !self.signal.is_running() {
                        return ReaderExit::Stopped;
                    }
                    tracing::warn!("{}", e);
                    // The supervisor may already be gone during shutdown
                    let _ = self.disconnects.send(self.generation);
                    return ReaderExit::Disconnected;
                }
            }
        }
        ReaderExit::Stopped
    }
}

#[cfg(all(test, feature = "mock-source"))]
mod tests {
    use super::*;
    use crate::pipeline::handoff::handoff;
    use crate::source::MockLineSource;
    use crossbeam_channel::{bounded, unbounded};
    use std::time::Duration;

    #[test]
    fn test_reader_forwards_then_reports_disconnect() {
        let source = MockLineSource::new("mock0")
            .with_read_timeout(Duration::from_millis(2))
            .with_lines(["23.4", "-1.2"])
            .then_disconnect(0);
        let source = Arc::new(SourceHandle::new(Box::new(source)));
        let generation = source.open().unwrap();

        let signal = ShutdownSignal::new();
        let counters = Arc::new(PipelineCounters::new());
        let (event_tx, event_rx) = bounded(16);
        let (disconnect_tx, disconnect_rx) = unbounded();
        let (handoff_tx, handoff_rx) = handoff(8, Duration::from_millis(5));

        let reader = ReaderTask::new(
            Arc::clone(&source),
            generation,
            handoff_tx,
            disconnect_tx,
            EventSink::new(event_tx, Arc::clone(&counters)),
            signal.clone(),
            Arc::clone(&counters),
        );
        assert_eq!(reader.run(), ReaderExit::Disconnected);

        assert_eq!(disconnect_rx.try_recv().unwrap(), generation);
        let texts: Vec<_> = handoff_rx.drain().into_iter().map(|l| l.text).collect();
        assert_eq!(texts, vec!["23.4", "-1.2"]);
        let echoed = event_rx
            .try_iter()
            .filter(|e| matches!(e, PipelineEvent::Line(_)))
            .count();
        assert_eq!(echoed, 2);
        assert_eq!(counters.snapshot().lines_read, 2);
    }

    #[test]
    fn test_reader_stops_on_signal() {
        let source = MockLineSource::new("mock0").with_read_timeout(Duration::from_millis(2));
        let source = Arc::new(SourceHandle::new(Box::new(source)));
        let generation = source.open().unwrap();

        let signal = ShutdownSignal::new();
        let counters = Arc::new(PipelineCounters::new());
        let (event_tx, _event_rx) = bounded(16);
        let (disconnect_tx, disconnect_rx) = unbounded();
        let (handoff_tx, _handoff_rx) = handoff(8, Duration::from_millis(5));

        let handle = ReaderTask::new(
            source,
            generation,
            handoff_tx,
            disconnect_tx,
            EventSink::new(event_tx, Arc::clone(&counters)),
            signal.clone(),
            counters,
        )
        .spawn()
        .unwrap();

        std::thread::sleep(Duration::from_millis(20));
        signal.trigger();
        assert_eq!(handle.join().unwrap(), ReaderExit::Stopped);
        assert!(disconnect_rx.try_recv().is_err());
    }
}
