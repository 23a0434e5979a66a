//! Pipeline controller
//!
//! Wires source → reader → handoff → writer → sink, runs the control command
//! loop and performs the single stop sequence:
//!
//! 1. trigger the shutdown signal (wakes every blocked wait)
//! 2. join the supervisor, then the reader it owns
//! 3. join the writer, which finishes the lines already handed off
//! 4. close the source
//! 5. seal the sink
//!
//! The sink is sealed only after the writer is joined, so nothing can be
//! written after seal.

use super::command::ControlCommand;
use super::events::{EventSink, PipelineEvent};
use super::handoff::{handoff, HandoffReceiver};
use super::signal::ShutdownSignal;
use super::stats::PipelineCounters;
use super::supervisor::ConnectionSupervisor;
use super::writer::WriterTask;
use crate::config::PortLogConfig;
use crate::error::{PortLogError, Result, ResultExt};
use crate::sink::{LogFileLayout, LogSink, LogStore};
use crate::source::{self, LineSource, SourceHandle};
use crate::types::{ConnectionStatus, PipelineStats};
use crossbeam_channel::{bounded, select, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Capacity of the control command queue
const COMMAND_CAPACITY: usize = 256;

/// Creates the backing store for each log artifact (start and every rotation)
pub type StoreFactory = Box<dyn FnMut() -> Result<Box<dyn LogStore>> + Send>;

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    pub stats: PipelineStats,
    /// Location of the artifact sealed by the stop sequence
    pub sealed_log: Option<String>,
}

/// Top-level orchestrator for one pipeline run
pub struct PipelineController {
    config: PortLogConfig,
    source: Arc<SourceHandle>,
    store_factory: StoreFactory,
    signal: ShutdownSignal,
    counters: Arc<PipelineCounters>,
    events: EventSink,
    commands: Receiver<ControlCommand>,
    sink: Option<Arc<LogSink>>,
    supervisor: Option<ConnectionSupervisor>,
    supervisor_thread: Option<JoinHandle<()>>,
    writer_thread: Option<JoinHandle<()>>,
    started: bool,
    report: Option<StopReport>,
    failure: Option<PortLogError>,
}

impl std::fmt::Debug for PipelineController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineController")
            .field("source", &self.source)
            .field("sink", &self.sink)
            .field("started", &self.started)
            .field("stopped", &self.report.is_some())
            .finish()
    }
}

impl PipelineController {
    /// Create a controller from explicit parts
    ///
    /// The source is taken closed; `store_factory` is called once at start
    /// and once per rotation.
    pub fn new(
        config: PortLogConfig,
        source: Box<dyn LineSource>,
        store_factory: StoreFactory,
    ) -> (Self, PipelineHandle) {
        let signal = ShutdownSignal::new();
        let counters = Arc::new(PipelineCounters::new());
        let (command_tx, command_rx) = bounded(COMMAND_CAPACITY);
        // Bounded so a stalled display cannot grow memory; overflow is counted
        let (event_tx, event_rx) = bounded(config.pipeline.event_capacity.max(1));

        let controller = Self {
            source: Arc::new(SourceHandle::new(source)),
            store_factory,
            signal: signal.clone(),
            events: EventSink::new(event_tx, Arc::clone(&counters)),
            counters,
            commands: command_rx,
            sink: None,
            supervisor: None,
            supervisor_thread: None,
            writer_thread: None,
            started: false,
            report: None,
            failure: None,
            config,
        };
        let handle = PipelineHandle {
            commands: command_tx,
            events: event_rx,
            signal,
        };
        (controller, handle)
    }

    /// Create a controller for the configured source and log file layout
    pub fn from_config(config: PortLogConfig) -> Result<(Self, PipelineHandle)> {
        let source = source::from_config(&config.source);
        Self::with_source(config, source)
    }

    /// Create a controller for an already built source, logging to files
    /// laid out as `config.log` describes
    pub fn with_source(
        config: PortLogConfig,
        source: Box<dyn LineSource>,
    ) -> Result<(Self, PipelineHandle)> {
        config.validate()?;
        let layout = LogFileLayout::from(&config.log);
        let factory: StoreFactory = Box::new(move || {
            let store = layout.create().map_err(|source| PortLogError::WriteFailure {
                location: layout.base_directory.display().to_string(),
                source,
            })?;
            Ok(Box::new(store) as Box<dyn LogStore>)
        });
        Ok(Self::new(config, source, factory))
    }

    pub fn config(&self) -> &PortLogConfig {
        &self.config
    }

    pub fn source(&self) -> &Arc<SourceHandle> {
        &self.source
    }

    pub fn sink(&self) -> Option<&Arc<LogSink>> {
        self.sink.as_ref()
    }

    /// Location of the artifact currently being written
    pub fn log_location(&self) -> Option<String> {
        self.sink.as_ref().map(|sink| sink.location())
    }

    pub fn supervisor(&self) -> Option<&ConnectionSupervisor> {
        self.supervisor.as_ref()
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.started && self.report.is_none() && self.signal.is_running()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        if self.source.is_open() {
            ConnectionStatus::Connected
        } else if self.supervisor.as_ref().is_some_and(|s| s.is_reconnecting()) {
            ConnectionStatus::Reconnecting
        } else {
            ConnectionStatus::Disconnected
        }
    }

    /// Validate, open the source and the sink, and launch the tasks
    ///
    /// Fails with the open error if the source is unavailable, unless
    /// `supervisor.wait_for_source` is set, in which case the supervisor
    /// keeps retrying in the background.
    pub fn start(&mut self) -> Result<()> {
        if self.report.is_some() {
            return Err(PortLogError::Channel("pipeline already stopped".to_string()));
        }
        if self.started {
            tracing::warn!("Pipeline already started");
            return Ok(());
        }
        self.config.validate()?;

        let (handoff_tx, handoff_rx) = handoff(
            self.config.pipeline.handoff_capacity,
            self.config.pipeline.handoff_wait(),
        );
        let supervisor = ConnectionSupervisor::new(
            Arc::clone(&self.source),
            self.config.supervisor.clone(),
            handoff_tx,
            self.events.clone(),
            self.signal.clone(),
            Arc::clone(&self.counters),
        );

        let generation = match supervisor.connect() {
            Ok(generation) => Some(generation),
            Err(e) if self.config.supervisor.wait_for_source => {
                tracing::warn!("{}; waiting for the source to appear", e);
                self.events.status(ConnectionStatus::Disconnected);
                None
            }
            Err(e) => {
                tracing::error!("{}", e);
                return Err(e);
            }
        };

        let store = match (self.store_factory)() {
            Ok(store) => store,
            Err(e) => {
                tracing::error!("Failed to open log: {}", e);
                self.source.close();
                return Err(e);
            }
        };
        let sink = Arc::new(LogSink::new(store));
        self.sink = Some(Arc::clone(&sink));
        self.supervisor = Some(supervisor.clone());
        self.started = true;

        if let Err(e) = self.launch(sink, handoff_rx, &supervisor, generation) {
            tracing::error!("Failed to launch pipeline tasks: {}", e);
            self.stop();
            return Err(e);
        }

        tracing::info!(
            "Pipeline started: {} -> {}",
            self.source.identity(),
            self.log_location().unwrap_or_default()
        );
        Ok(())
    }

    fn launch(
        &mut self,
        sink: Arc<LogSink>,
        handoff_rx: HandoffReceiver,
        supervisor: &ConnectionSupervisor,
        generation: Option<u64>,
    ) -> Result<()> {
        let writer = WriterTask::new(
            sink,
            handoff_rx,
            self.events.clone(),
            self.signal.clone(),
            Arc::clone(&self.counters),
        );
        self.writer_thread = Some(writer.spawn().context("Failed to start the writer")?);

        if let Some(generation) = generation {
            supervisor
                .start_reader(generation)
                .with_context(|| format!("Failed to start the reader for generation {generation}"))?;
        }
        self.supervisor_thread = Some(supervisor.spawn().context("Failed to start the supervisor")?);
        Ok(())
    }

    /// Start if needed, then process commands until stop or a fatal error
    ///
    /// Returns the fatal error that ended the run, if there was one.
    pub fn run(&mut self) -> Result<StopReport> {
        self.start()?;

        loop {
            let command = select! {
                recv(self.commands) -> command => command.ok(),
                recv(self.signal.stopped()) -> _ => None,
            };

            match command {
                Some(ControlCommand::Stop) => {
                    tracing::info!("Stop requested");
                    break;
                }
                Some(ControlCommand::Send(text)) => {
                    let _ = self.send_line(&text);
                }
                Some(ControlCommand::Rotate) => {
                    let _ = self.rotate();
                }
                None => break,
            }
        }

        let report = self.stop();
        match self.failure.take() {
            Some(error) => Err(error),
            None => Ok(report),
        }
    }

    /// Write an outbound line to the source
    ///
    /// Failures are reported as an event and a warning; they do not stop
    /// the pipeline.
    pub fn send_line(&self, text: &str) -> Result<()> {
        match self.source.write_line(text) {
            Ok(()) => {
                tracing::debug!("Sent {:?} to {}", text, self.source.identity());
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Could not send {:?}: {}", text, e);
                self.events
                    .emit(PipelineEvent::OutboundFailed(format!("{text}: {e}")));
                Err(e)
            }
        }
    }

    /// Seal the current log and continue in a new one
    ///
    /// Returns the sealed location. If only the old log failed to seal,
    /// logging has still moved to the new one: `Rotated` is emitted along
    /// with an `Error` event.
    pub fn rotate(&mut self) -> Result<String> {
        let Some(sink) = self.sink.as_ref() else {
            return Err(PortLogError::Channel("pipeline not started".to_string()));
        };

        let result = (self.store_factory)().and_then(|next| sink.rotate(next));
        match result {
            Ok(rotation) => {
                self.events.emit(PipelineEvent::Rotated {
                    sealed: rotation.sealed.clone(),
                    current: sink.location(),
                });
                if let Some(e) = rotation.seal_error {
                    tracing::warn!("Rotated, but {} was not sealed: {}", rotation.sealed, e);
                    self.events.emit(PipelineEvent::Error(e.to_string()));
                }
                Ok(rotation.sealed)
            }
            Err(e) => {
                tracing::warn!("Log rotation failed: {}", e);
                self.events.emit(PipelineEvent::Error(e.to_string()));
                Err(e)
            }
        }
    }

    /// Run the stop sequence once; later calls return the same report
    pub fn stop(&mut self) -> StopReport {
        if let Some(report) = &self.report {
            return report.clone();
        }
        tracing::info!("Stopping pipeline");
        self.signal.trigger();

        if let Some(handle) = self.supervisor_thread.take() {
            if handle.join().is_err() {
                tracing::error!("Supervisor thread panicked");
            }
        }
        if let Some(supervisor) = &self.supervisor {
            supervisor.shutdown();
        }
        if let Some(handle) = self.writer_thread.take() {
            if handle.join().is_err() {
                tracing::error!("Writer thread panicked");
            }
        }

        self.source.close();
        self.events.status(ConnectionStatus::Disconnected);

        let mut failure = self.signal.take_failure();
        let sealed_log = match &self.sink {
            Some(sink) => match sink.seal() {
                Ok(location) => location,
                Err(e) => {
                    tracing::error!("{}", e);
                    self.events.emit(PipelineEvent::Error(e.to_string()));
                    failure.get_or_insert(e);
                    None
                }
            },
            None => None,
        };
        self.failure = failure;

        let report = StopReport {
            stats: self.counters.snapshot(),
            sealed_log,
        };
        tracing::info!(
            "Pipeline stopped: {} read, {} written, {} discarded, {} reconnects",
            report.stats.lines_read,
            report.stats.lines_written,
            report.stats.lines_discarded,
            report.stats.reconnect_episodes
        );
        self.events.emit(PipelineEvent::Stopped);
        self.report = Some(report.clone());
        report
    }

    /// Fatal error recorded by the stop sequence, if any
    pub fn failure(&self) -> Option<&PortLogError> {
        self.failure.as_ref()
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        if self.started && self.report.is_none() {
            self.stop();
        }
    }
}

/// Cloneable control and observer handle for a running pipeline
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    commands: Sender<ControlCommand>,
    events: Receiver<PipelineEvent>,
    signal: ShutdownSignal,
}

impl PipelineHandle {
    /// Queue a command; false if the controller is gone
    pub fn submit(&self, command: ControlCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Parse and queue one operator input line
    ///
    /// Blank input is ignored. Returns the command that was queued.
    pub fn submit_text(&self, input: &str) -> Option<ControlCommand> {
        let command = ControlCommand::parse(input)?;
        self.submit(command.clone()).then_some(command)
    }

    pub fn send_line(&self, text: impl Into<String>) -> bool {
        self.submit(ControlCommand::Send(text.into()))
    }

    pub fn rotate(&self) -> bool {
        self.submit(ControlCommand::Rotate)
    }

    /// Request the stop sequence
    pub fn stop(&self) -> bool {
        self.submit(ControlCommand::Stop)
    }

    /// False once the stop sequence has begun
    pub fn is_running(&self) -> bool {
        self.signal.is_running()
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&self) -> Option<PipelineEvent> {
        self.events.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event
    ///
    /// Returns `Err` only once the controller is gone and no events remain.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<PipelineEvent>> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(PortLogError::Channel("pipeline dropped".to_string()))
            }
        }
    }

    /// Receive all pending events
    pub fn drain(&self) -> Vec<PipelineEvent> {
        self.events.try_iter().collect()
    }
}
