//! # Port Logger: connection-supervised serial line logger
//!
//! Reads text lines from a serial port (or, as a fallback, from a TCP
//! client), timestamps them and appends them to an append-only log file.
//! When the device drops, a supervisor reopens it and reading resumes; on
//! exit the log file is sealed read-only.
//!
//! ## Architecture
//!
//! - **Source**: [`source::LineSource`] over serial, TCP or a scripted mock
//! - **Sink**: [`sink::LogSink`] over a file or an in-memory buffer
//! - **Pipeline**: reader, writer and supervisor threads coordinated by a
//!   shared shutdown signal and crossbeam channels
//! - **Control**: a text command channel (`QUIT` stops) and an event stream
//!   for console or UI echo
//!
//! ## Configuration
//!
//! Configs are TOML files, found by path or by console name under
//! `./configs` or the platform config directory:
//!
//! - **Linux**: `~/.config/port-logger/configs/`
//! - **macOS**: `~/Library/Application Support/port-logger/configs/`
//! - **Windows**: `%APPDATA%\port-logger\configs\`
//!
//! ## Example
//!
//! ```ignore
//! use port_logger::{PipelineController, PortLogConfig};
//!
//! fn main() -> port_logger::Result<()> {
//!     let config = PortLogConfig::load("configs/bench.toml")?;
//!     let (mut controller, handle) = PipelineController::from_config(config)?;
//!
//!     std::thread::spawn(move || {
//!         for line in std::io::stdin().lines().map_while(Result::ok) {
//!             handle.submit_text(&line);
//!         }
//!     });
//!
//!     let report = controller.run()?;
//!     println!("{} lines written", report.stats.lines_written);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod types;

// Re-export commonly used types
pub use config::PortLogConfig;
pub use error::{PortLogError, Result, ResultExt};
pub use pipeline::{ControlCommand, PipelineController, PipelineEvent, PipelineHandle, StopReport};
pub use sink::{LogSink, LogStore};
pub use source::{LineSource, SourceHandle};
pub use types::{ConnectionStatus, LogLine, PipelineStats};
