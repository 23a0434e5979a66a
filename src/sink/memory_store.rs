//! In-memory log store
//!
//! Keeps entries in a buffer shared with a [`MemoryLogView`], for display
//! front ends and tests. An optional capacity limit turns further writes into
//! I/O errors, which is how tests exercise the write-failure path.

use super::LogStore;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MemoryLog {
    lines: Vec<String>,
    finalized: bool,
}

/// Log store that writes into a shared buffer
#[derive(Debug)]
pub struct MemoryLogStore {
    name: String,
    capacity: Option<usize>,
    shared: Arc<Mutex<MemoryLog>>,
}

/// Read side of a [`MemoryLogStore`]
#[derive(Debug, Clone)]
pub struct MemoryLogView {
    shared: Arc<Mutex<MemoryLog>>,
}

impl MemoryLogStore {
    /// Create a store and a view onto its lines
    pub fn new(name: impl Into<String>) -> (Self, MemoryLogView) {
        let shared = Arc::new(Mutex::new(MemoryLog::default()));
        let view = MemoryLogView {
            shared: Arc::clone(&shared),
        };
        (
            Self {
                name: name.into(),
                capacity: None,
                shared,
            },
            view,
        )
    }

    /// Fail every write after `lines` successful ones
    pub fn with_capacity_limit(mut self, lines: usize) -> Self {
        self.capacity = Some(lines);
        self
    }
}

impl LogStore for MemoryLogStore {
    fn location(&self) -> String {
        self.name.clone()
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut log = lock(&self.shared);
        if log.finalized {
            return Err(io::Error::new(io::ErrorKind::Other, "log already finalized"));
        }
        if self.capacity.is_some_and(|cap| log.lines.len() >= cap) {
            return Err(io::Error::new(io::ErrorKind::OutOfMemory, "memory log full"));
        }
        log.lines.push(line.to_string());
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn finalize(&mut self) -> io::Result<()> {
        lock(&self.shared).finalized = true;
        Ok(())
    }
}

impl MemoryLogView {
    /// Entries written so far
    pub fn lines(&self) -> Vec<String> {
        lock(&self.shared).lines.clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.shared).lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_finalized(&self) -> bool {
        lock(&self.shared).finalized
    }
}

fn lock(shared: &Mutex<MemoryLog>) -> MutexGuard<'_, MemoryLog> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}
