//! Mock Line Source for Testing
//!
//! A scripted [`LineSource`] that replays lines, timeouts and disconnects
//! without hardware. A [`MockSourceProbe`] shares the script state so a test
//! can inspect open attempts and outbound writes, or inject more lines while
//! the pipeline runs.
//!
//! # Example
//!
//! ```ignore
//! use port_logger::source::{MockLineSource, MockStep};
//!
//! let source = MockLineSource::new("mock0")
//!     .with_lines(["23.4", "-1.2"])
//!     .then_disconnect(2) // refuse the next two opens
//!     .with_lines(["99.9"]);
//! let probe = source.probe();
//! ```
//!
//! # Enabling
//!
//! The mock source is only available when the `mock-source` feature is
//! enabled (it is part of the default features).

use super::LineSource;
use crate::error::{PortLogError, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// One scripted source behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockStep {
    /// Deliver a line
    Line(String),
    /// Report one read timeout
    Timeout,
    /// Drop the connection and refuse the next `refuse_opens` open attempts
    Disconnect { refuse_opens: u32 },
}

#[derive(Debug, Default)]
struct MockState {
    steps: VecDeque<MockStep>,
    open: bool,
    refuse_opens: u32,
    open_calls: u64,
    successful_opens: u64,
    written: Vec<String>,
}

/// Scripted line source
#[derive(Debug)]
pub struct MockLineSource {
    identity: String,
    read_timeout: Duration,
    shared: Arc<Mutex<MockState>>,
}

impl MockLineSource {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            read_timeout: Duration::from_millis(20),
            shared: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// How long a read waits when the script is exhausted
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Append lines to the script
    pub fn with_lines<I, S>(self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut state = lock(&self.shared);
            state
                .steps
                .extend(lines.into_iter().map(|l| MockStep::Line(l.into())));
        }
        self
    }

    /// Append a disconnect that refuses the next `refuse_opens` opens
    pub fn then_disconnect(self, refuse_opens: u32) -> Self {
        self.with_step(MockStep::Disconnect { refuse_opens })
    }

    /// Append an arbitrary step
    pub fn with_step(self, step: MockStep) -> Self {
        lock(&self.shared).steps.push_back(step);
        self
    }

    /// Refuse the first `count` open attempts (device not plugged in yet)
    pub fn refuse_first_opens(self, count: u32) -> Self {
        lock(&self.shared).refuse_opens = count;
        self
    }

    /// Shared inspection handle
    pub fn probe(&self) -> MockSourceProbe {
        MockSourceProbe {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl LineSource for MockLineSource {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn open(&mut self) -> Result<()> {
        let mut state = lock(&self.shared);
        state.open_calls += 1;
        if state.refuse_opens > 0 {
            state.refuse_opens -= 1;
            return Err(PortLogError::unavailable(&self.identity, "device not present"));
        }
        state.open = true;
        state.successful_opens += 1;
        Ok(())
    }

    fn close(&mut self) {
        lock(&self.shared).open = false;
    }

    fn is_open(&self) -> bool {
        lock(&self.shared).open
    }

    fn read_line(&mut self) -> Result<String> {
        let step = {
            let mut state = lock(&self.shared);
            if !state.open {
                return Err(PortLogError::disconnected(&self.identity, "not open"));
            }
            state.steps.pop_front()
        };

        match step {
            Some(MockStep::Line(line)) => Ok(line),
            Some(MockStep::Disconnect { refuse_opens }) => {
                let mut state = lock(&self.shared);
                state.open = false;
                state.refuse_opens = refuse_opens;
                Err(PortLogError::disconnected(&self.identity, "simulated unplug"))
            }
            Some(MockStep::Timeout) | None => {
                std::thread::sleep(self.read_timeout);
                Err(PortLogError::ReadTimeout)
            }
        }
    }

    fn write_line(&mut self, text: &str) -> Result<()> {
        let mut state = lock(&self.shared);
        if !state.open {
            return Err(PortLogError::disconnected(&self.identity, "not open"));
        }
        state.written.push(text.to_string());
        Ok(())
    }
}

/// Inspection and injection handle for a [`MockLineSource`]
#[derive(Debug, Clone)]
pub struct MockSourceProbe {
    shared: Arc<Mutex<MockState>>,
}

impl MockSourceProbe {
    /// Total open attempts, failed ones included
    pub fn open_calls(&self) -> u64 {
        lock(&self.shared).open_calls
    }

    pub fn successful_opens(&self) -> u64 {
        lock(&self.shared).successful_opens
    }

    pub fn is_open(&self) -> bool {
        lock(&self.shared).open
    }

    /// Lines written to the source so far
    pub fn written_lines(&self) -> Vec<String> {
        lock(&self.shared).written.clone()
    }

    /// Script steps not yet consumed
    pub fn remaining_steps(&self) -> usize {
        lock(&self.shared).steps.len()
    }

    /// Queue more lines at the end of the script
    pub fn push_lines<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.shared)
            .steps
            .extend(lines.into_iter().map(|l| MockStep::Line(l.into())));
    }

    /// Queue a step at the end of the script
    pub fn push_step(&self, step: MockStep) {
        lock(&self.shared).steps.push_back(step);
    }
}

fn lock(shared: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}
