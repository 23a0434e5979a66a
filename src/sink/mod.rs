//! Log sink: the append-only destination for timestamped lines
//!
//! # Components
//!
//! - [`LogStore`] - Backing medium (file on disk, in-memory buffer for a UI)
//! - [`LogSink`] - Serializes appends, tracks Open/Sealed, seals and rotates
//! - [`FileLogStore`] / [`LogFileLayout`] - `<base>/<year>/<month>/<day>/<time>/<file>`
//! - [`MemoryLogStore`] - Shared line buffer
//!
//! # Entry Format
//!
//! One entry per line: `"<YYYY-MM-DD HH:MM:SS.mmm>: <raw text>"`. Timestamps
//! within one sink never go backwards; a wall-clock step back is clamped to
//! the previous entry's time.

pub mod file_store;
pub mod memory_store;

pub use file_store::{FileLogStore, LogFileLayout};
pub use memory_store::{MemoryLogStore, MemoryLogView};

use crate::error::{PortLogError, Result};
use crate::types::{SinkState, TIMESTAMP_FORMAT};
use chrono::{DateTime, Local, NaiveDateTime};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Length of a rendered [`TIMESTAMP_FORMAT`] timestamp
const TIMESTAMP_LEN: usize = 23;

/// Separator between timestamp and text
const ENTRY_SEPARATOR: &str = ": ";

/// Outcome of [`LogSink::rotate`]
#[derive(Debug)]
pub struct Rotation {
    /// Location of the artifact that was closed
    pub sealed: String,
    /// Set when the closed artifact could not be flushed or made read-only
    pub seal_error: Option<PortLogError>,
}

/// Backing medium for a [`LogSink`]
///
/// Implementations only need to write; mutual exclusion, ordering and the
/// sealed state are handled by [`LogSink`].
#[cfg_attr(test, mockall::automock)]
pub trait LogStore: Send {
    /// Path or name of the artifact, for messages
    fn location(&self) -> String;

    /// Append one already-formatted entry (without newline)
    fn write_line(&mut self, line: &str) -> std::io::Result<()>;

    /// Push buffered data to the medium
    fn flush(&mut self) -> std::io::Result<()>;

    /// Close the medium and mark the artifact immutable where supported
    fn finalize(&mut self) -> std::io::Result<()>;
}

/// Render one log entry
pub fn format_entry(timestamp: &DateTime<Local>, text: &str) -> String {
    format!(
        "{}{}{}",
        timestamp.format(TIMESTAMP_FORMAT),
        ENTRY_SEPARATOR,
        text
    )
}

/// Split a log entry into its timestamp and text
///
/// Returns `None` for lines that are not entries.
pub fn parse_entry(line: &str) -> Option<(NaiveDateTime, &str)> {
    let stamp = line.get(..TIMESTAMP_LEN)?;
    let text = line.get(TIMESTAMP_LEN..)?.strip_prefix(ENTRY_SEPARATOR)?;
    let timestamp = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
    Some((timestamp, text))
}

struct SinkInner {
    store: Box<dyn LogStore>,
    state: SinkState,
    last_timestamp: Option<DateTime<Local>>,
    entries: u64,
}

/// Append-only log destination shared between the writer and the controller
pub struct LogSink {
    inner: Mutex<SinkInner>,
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("LogSink")
            .field("location", &inner.store.location())
            .field("state", &inner.state)
            .field("entries", &inner.entries)
            .finish()
    }
}

impl LogSink {
    /// Wrap an open store
    pub fn new(store: Box<dyn LogStore>) -> Self {
        Self {
            inner: Mutex::new(SinkInner {
                store,
                state: SinkState::Open,
                last_timestamp: None,
                entries: 0,
            }),
        }
    }

    pub fn state(&self) -> SinkState {
        self.lock().state
    }

    pub fn location(&self) -> String {
        self.lock().store.location()
    }

    /// Entries appended to the current artifact
    pub fn entries(&self) -> u64 {
        self.lock().entries
    }

    /// Append one line, returning the timestamp actually written
    ///
    /// Fails with [`PortLogError::WriteFailure`] on I/O error and with
    /// [`PortLogError::SinkSealed`] after [`LogSink::seal`].
    pub fn append(&self, timestamp: DateTime<Local>, text: &str) -> Result<DateTime<Local>> {
        let mut inner = self.lock();
        if inner.state == SinkState::Sealed {
            tracing::error!("Append after seal on {}", inner.store.location());
            return Err(PortLogError::SinkSealed(inner.store.location()));
        }

        let timestamp = match inner.last_timestamp {
            Some(last) if timestamp < last => last,
            _ => timestamp,
        };

        let entry = format_entry(&timestamp, text);
        let result = inner
            .store
            .write_line(&entry)
            .and_then(|_| inner.store.flush());
        if let Err(source) = result {
            return Err(PortLogError::WriteFailure {
                location: inner.store.location(),
                source,
            });
        }

        inner.last_timestamp = Some(timestamp);
        inner.entries += 1;
        Ok(timestamp)
    }

    /// Flush, close and mark the artifact immutable
    ///
    /// Returns the sealed location the first time and `None` afterwards. The
    /// sink is Sealed after this call even if finalizing reported an error.
    pub fn seal(&self) -> Result<Option<String>> {
        let mut inner = self.lock();
        if inner.state == SinkState::Sealed {
            return Ok(None);
        }
        inner.state = SinkState::Sealed;
        Self::finalize_store(&mut inner).map(Some)
    }

    /// Seal the current artifact and continue on `next`
    ///
    /// The switch to `next` always happens once the sink is open: an old
    /// artifact that fails to finalize is reported in
    /// [`Rotation::seal_error`], not as an error, since logging has already
    /// moved on.
    pub fn rotate(&self, next: Box<dyn LogStore>) -> Result<Rotation> {
        let mut inner = self.lock();
        if inner.state == SinkState::Sealed {
            return Err(PortLogError::SinkSealed(inner.store.location()));
        }

        let sealed = inner.store.location();
        let seal_error = Self::finalize_store(&mut inner).err();
        inner.store = next;
        inner.entries = 0;
        tracing::info!("Log rotated to {}", inner.store.location());
        Ok(Rotation { sealed, seal_error })
    }

    fn finalize_store(inner: &mut SinkInner) -> Result<String> {
        let location = inner.store.location();
        let flushed = inner.store.flush();
        let finalized = inner.store.finalize();

        match flushed.and(finalized) {
            Ok(()) => {
                tracing::info!("Sealed log {} ({} entries)", location, inner.entries);
                Ok(location)
            }
            Err(source) => {
                tracing::error!("Failed to seal log {}: {}", location, source);
                Err(PortLogError::WriteFailure { location, source })
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, SinkInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use mockall::predicate::*;

    fn ts(secs: u32, millis: i64) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 10, 0, secs).unwrap()
            + ChronoDuration::milliseconds(millis)
    }

    #[test]
    fn test_format_and_parse_entry() {
        let entry = format_entry(&ts(7, 42), "x: y");
        assert_eq!(entry, "2024-05-01 10:00:07.042: x: y");

        let (stamp, text) = parse_entry(&entry).unwrap();
        assert_eq!(text, "x: y");
        assert_eq!(stamp, ts(7, 42).naive_local());

        assert!(parse_entry("not an entry").is_none());
        assert!(parse_entry("2024-05-01 10:00:07.042 missing separator").is_none());
    }

    #[test]
    fn test_timestamps_never_go_backwards() {
        let (store, view) = MemoryLogStore::new("mem");
        let sink = LogSink::new(Box::new(store));

        sink.append(ts(5, 0), "a").unwrap();
        let clamped = sink.append(ts(4, 0), "b").unwrap();
        assert_eq!(clamped, ts(5, 0));
        sink.append(ts(6, 0), "c").unwrap();

        let stamps: Vec<_> = view
            .lines()
            .iter()
            .map(|l| parse_entry(l).unwrap().0)
            .collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(sink.entries(), 3);
    }

    #[test]
    fn test_seal_is_idempotent_and_blocks_appends() {
        let (store, view) = MemoryLogStore::new("mem");
        let sink = LogSink::new(Box::new(store));
        sink.append(ts(0, 0), "only").unwrap();

        assert_eq!(sink.seal().unwrap(), Some("mem".to_string()));
        assert_eq!(sink.seal().unwrap(), None);
        assert_eq!(sink.state(), SinkState::Sealed);
        assert!(view.is_finalized());

        assert!(matches!(
            sink.append(ts(1, 0), "late"),
            Err(PortLogError::SinkSealed(_))
        ));
        assert_eq!(view.lines().len(), 1);
    }

    #[test]
    fn test_write_failure_is_reported_and_seal_still_works() {
        let mut store = MockLogStore::new();
        store.expect_location().return_const("disk".to_string());
        store
            .expect_write_line()
            .with(function(|l: &str| l.ends_with("first")))
            .times(1)
            .returning(|_| Ok(()));
        store
            .expect_write_line()
            .with(function(|l: &str| l.ends_with("second")))
            .times(1)
            .returning(|_| Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full")));
        store.expect_flush().returning(|| Ok(()));
        store.expect_finalize().times(1).returning(|| Ok(()));

        let sink = LogSink::new(Box::new(store));
        sink.append(ts(0, 0), "first").unwrap();
        let err = sink.append(ts(1, 0), "second").unwrap_err();
        assert!(matches!(err, PortLogError::WriteFailure { .. }));
        assert!(err.is_fatal());
        assert_eq!(sink.entries(), 1);

        assert_eq!(sink.seal().unwrap(), Some("disk".to_string()));
        assert_eq!(sink.seal().unwrap(), None);
    }

    #[test]
    fn test_seal_reports_finalize_error_once() {
        let mut store = MockLogStore::new();
        store.expect_location().return_const("disk".to_string());
        store.expect_flush().returning(|| Ok(()));
        store
            .expect_finalize()
            .times(1)
            .returning(|| Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "ro")));

        let sink = LogSink::new(Box::new(store));
        assert!(sink.seal().is_err());
        assert_eq!(sink.state(), SinkState::Sealed);
        assert_eq!(sink.seal().unwrap(), None);
    }

    #[test]
    fn test_rotate_seals_previous_store() {
        let (first, first_view) = MemoryLogStore::new("first");
        let (second, second_view) = MemoryLogStore::new("second");
        let sink = LogSink::new(Box::new(first));

        sink.append(ts(0, 0), "a").unwrap();
        let rotation = sink.rotate(Box::new(second)).unwrap();
        assert_eq!(rotation.sealed, "first");
        assert!(rotation.seal_error.is_none());
        sink.append(ts(1, 0), "b").unwrap();

        assert!(first_view.is_finalized());
        assert_eq!(first_view.lines().len(), 1);
        assert_eq!(second_view.lines().len(), 1);
        assert_eq!(sink.location(), "second");

        sink.seal().unwrap();
        let (third, _) = MemoryLogStore::new("third");
        assert!(sink.rotate(Box::new(third)).is_err());
    }

    #[test]
    fn test_rotate_moves_on_when_old_store_fails_to_finalize() {
        let mut store = MockLogStore::new();
        store.expect_location().return_const("disk".to_string());
        store.expect_write_line().times(1).returning(|_| Ok(()));
        store.expect_flush().returning(|| Ok(()));
        store
            .expect_finalize()
            .times(1)
            .returning(|| Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "ro")));

        let sink = LogSink::new(Box::new(store));
        sink.append(ts(0, 0), "old").unwrap();

        let (next, next_view) = MemoryLogStore::new("new");
        let rotation = sink.rotate(Box::new(next)).unwrap();
        assert_eq!(rotation.sealed, "disk");
        assert!(matches!(
            rotation.seal_error,
            Some(PortLogError::WriteFailure { ref location, .. }) if location == "disk"
        ));

        // Logging continues on the new store and the sink stays open
        assert_eq!(sink.location(), "new");
        assert_eq!(sink.state(), SinkState::Open);
        assert_eq!(sink.entries(), 0);
        sink.append(ts(1, 0), "fresh").unwrap();
        assert_eq!(next_view.len(), 1);
    }
}
