//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use chrono::NaiveDateTime;
use port_logger::pipeline::PipelineEvent;
use port_logger::sink::parse_entry;
use port_logger::{PipelineController, PipelineHandle, PipelineStats, StopReport};
use std::time::{Duration, Instant};

/// Upper bound for anything a test waits on
pub fn test_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Collect events until one matches `done` (inclusive) or the timeout passes
pub fn collect_events_until(
    handle: &PipelineHandle,
    timeout: Duration,
    mut done: impl FnMut(&PipelineEvent) -> bool,
) -> Vec<PipelineEvent> {
    let deadline = Instant::now() + timeout;
    let mut events = Vec::new();
    while Instant::now() < deadline {
        if let Ok(Some(event)) = handle.recv_timeout(Duration::from_millis(20)) {
            let finished = done(&event);
            events.push(event);
            if finished {
                break;
            }
        }
    }
    events
}

/// Split log entries into timestamps and texts, panicking on malformed lines
pub fn split_entries<S: AsRef<str>>(lines: &[S]) -> (Vec<NaiveDateTime>, Vec<String>) {
    lines
        .iter()
        .map(|line| {
            let (timestamp, text) = parse_entry(line.as_ref())
                .unwrap_or_else(|| panic!("malformed log entry: {:?}", line.as_ref()));
            (timestamp, text.to_string())
        })
        .unzip()
}

/// Assert timestamps never decrease
pub fn assert_monotonic(timestamps: &[NaiveDateTime]) {
    for pair in timestamps.windows(2) {
        assert!(
            pair[0] <= pair[1],
            "Timestamps went backwards: {} then {}",
            pair[0],
            pair[1]
        );
    }
}

/// Position of the first event matching `predicate`
pub fn position_of(
    events: &[PipelineEvent],
    predicate: impl Fn(&PipelineEvent) -> bool,
) -> Option<usize> {
    events.iter().position(predicate)
}

/// Position of the `Line` event carrying `text`
pub fn line_position(events: &[PipelineEvent], text: &str) -> Option<usize> {
    position_of(events, |e| matches!(e, PipelineEvent::Line(l) if l.text == text))
}

/// Run the controller's command loop on a thread
///
/// The thread returns the run result and the final stats.
pub fn spawn_run(
    mut controller: PipelineController,
) -> std::thread::JoinHandle<(port_logger::Result<StopReport>, PipelineStats)> {
    std::thread::spawn(move || {
        let result = controller.run();
        let stats = controller.stats();
        (result, stats)
    })
}
