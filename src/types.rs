//! Core data types for the port logger
//!
//! Value types shared between the line sources, the log sink and the
//! pipeline tasks.

use chrono::{DateTime, Local};
use std::fmt;

/// Timestamp layout used for log entries and console echo (millisecond precision)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// A single line of text received from a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Wall-clock time the reader received the line
    pub received_at: DateTime<Local>,
    /// Raw text, without the line terminator
    pub text: String,
}

impl LogLine {
    /// Create a line stamped with the current time
    pub fn now(text: impl Into<String>) -> Self {
        Self {
            received_at: Local::now(),
            text: text.into(),
        }
    }

    /// Create a line with an explicit timestamp
    pub fn at(received_at: DateTime<Local>, text: impl Into<String>) -> Self {
        Self {
            received_at,
            text: text.into(),
        }
    }

    /// Render the receive time with [`TIMESTAMP_FORMAT`]
    pub fn timestamp_string(&self) -> String {
        self.received_at.format(TIMESTAMP_FORMAT).to_string()
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.timestamp_string(), self.text)
    }
}

/// Lifecycle state of a line source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SourceState {
    /// Not acquired
    #[default]
    Closed = 0,
    /// Acquired and readable
    Open = 1,
    /// Dropped while in use; waiting for the supervisor to reopen it
    Faulted = 2,
}

impl SourceState {
    /// Decode from the atomic representation
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => SourceState::Open,
            2 => SourceState::Faulted,
            _ => SourceState::Closed,
        }
    }
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceState::Closed => write!(f, "Closed"),
            SourceState::Open => write!(f, "Open"),
            SourceState::Faulted => write!(f, "Faulted"),
        }
    }
}

/// Lifecycle state of a log sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkState {
    /// Accepting appends
    #[default]
    Open,
    /// Flushed, closed and marked immutable; no further appends
    Sealed,
}

/// Phase of the connection supervisor's state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SupervisorPhase {
    /// Sleeping between polls
    #[default]
    Idle = 0,
    /// Inspecting the source state
    Checking = 1,
    /// Running a reconnect episode
    Reconnecting = 2,
}

impl SupervisorPhase {
    /// Decode from the atomic representation
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => SupervisorPhase::Checking,
            2 => SupervisorPhase::Reconnecting,
            _ => SupervisorPhase::Idle,
        }
    }
}

/// Connection status reported to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Source is closed
    #[default]
    Disconnected,
    /// Reconnect episode in progress
    Reconnecting,
    /// Source is open and being read
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Reconnecting => write!(f, "Reconnecting..."),
            ConnectionStatus::Connected => write!(f, "Connected"),
        }
    }
}

/// Statistics about a pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Lines read from the source
    pub lines_read: u64,
    /// Lines appended to the log sink
    pub lines_written: u64,
    /// Lines still queued when the pipeline stopped
    pub lines_discarded: u64,
    /// Reconnect episodes started
    pub reconnect_episodes: u64,
    /// Failed open attempts across all episodes
    pub failed_open_attempts: u64,
    /// Observer events dropped because the event queue was full
    pub dropped_events: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_log_line_display() {
        let ts = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let line = LogLine::at(ts, "23.4");
        assert_eq!(line.to_string(), "2024-03-09 14:05:07.000: 23.4");
    }

    #[test]
    fn test_source_state_roundtrip() {
        for state in [SourceState::Closed, SourceState::Open, SourceState::Faulted] {
            assert_eq!(SourceState::from_u8(state as u8), state);
        }
        assert_eq!(SourceState::from_u8(42), SourceState::Closed);
    }

    #[test]
    fn test_supervisor_phase_decode() {
        assert_eq!(SupervisorPhase::from_u8(2), SupervisorPhase::Reconnecting);
        assert_eq!(SupervisorPhase::default(), SupervisorPhase::Idle);
    }
}
