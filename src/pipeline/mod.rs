//! Connection-supervised read/log pipeline
//!
//! Lines flow from a [`SourceHandle`](crate::source::SourceHandle) through a
//! reader thread and a bounded handoff into a writer thread that appends
//! them to a [`LogSink`](crate::sink::LogSink). A supervisor thread owns the
//! source lifecycle and reopens it when it drops. The foreground control
//! loop in [`PipelineController::run`] accepts [`ControlCommand`]s.
//!
//! # Architecture
//!
//! ```text
//!                    ┌──────────── ConnectionSupervisor ◄─┐ disconnect
//!                    │ open/close                         │ report
//!                    ▼                                    │
//! [SourceHandle] ──► ReaderTask ──► handoff ──► WriterTask ──► [LogSink]
//!                         │
//!                         └──► PipelineEvent::Line ──► observers
//! ```
//!
//! # Coordination
//!
//! - **Shared stop** - one [`ShutdownSignal`] (atomic flag plus a channel
//!   that disconnects on trigger) is observed at every loop boundary and
//!   every blocking wait.
//! - **Bounded handoff** - crossbeam `bounded` channel; pushes wait in
//!   bounded steps, so back-pressure never hides a stop.
//! - **Single episode** - an atomic in-flight flag admits one reconnect
//!   episode at a time.
//! - **Dedicated threads** - each task runs on its own named thread.

pub mod command;
pub mod controller;
pub mod events;
pub mod handoff;
pub mod reader;
pub mod signal;
pub mod stats;
pub mod supervisor;
pub mod writer;

pub use command::{ControlCommand, QUIT_TOKEN};
pub use controller::{PipelineController, PipelineHandle, StopReport, StoreFactory};
pub use events::{EventSink, PipelineEvent};
pub use handoff::{handoff, HandoffReceiver, HandoffSender};
pub use reader::{ReaderExit, ReaderTask};
pub use signal::ShutdownSignal;
pub use stats::PipelineCounters;
pub use supervisor::{ConnectionSupervisor, ReconnectOutcome};
pub use writer::WriterTask;
