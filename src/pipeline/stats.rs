//! Lock-free counters shared by the pipeline tasks

use crate::types::PipelineStats;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters; [`PipelineCounters::snapshot`] gives a plain copy
#[derive(Debug, Default)]
pub struct PipelineCounters {
    pub lines_read: AtomicU64,
    pub lines_written: AtomicU64,
    pub lines_discarded: AtomicU64,
    pub reconnect_episodes: AtomicU64,
    pub failed_open_attempts: AtomicU64,
    pub dropped_events: AtomicU64,
}

impl PipelineCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one to a counter
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            lines_read: self.lines_read.load(Ordering::Relaxed),
            lines_written: self.lines_written.load(Ordering::Relaxed),
            lines_discarded: self.lines_discarded.load(Ordering::Relaxed),
            reconnect_episodes: self.reconnect_episodes.load(Ordering::Relaxed),
            failed_open_attempts: self.failed_open_attempts.load(Ordering::Relaxed),
            dropped_events: self.dropped_events.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let counters = PipelineCounters::new();
        PipelineCounters::bump(&counters.lines_read);
        PipelineCounters::bump(&counters.lines_read);
        PipelineCounters::bump(&counters.reconnect_episodes);
        counters.lines_discarded.fetch_add(3, Ordering::Relaxed);

        let stats = counters.snapshot();
        assert_eq!(stats.lines_read, 2);
        assert_eq!(stats.reconnect_episodes, 1);
        assert_eq!(stats.lines_discarded, 3);
        assert_eq!(stats.lines_written, 0);
    }
}
