//! Log file on disk
//!
//! Each run gets its own folder: `<base>/<yyyy>/<MM_Mon>/<MM_dd>/<HH_mm_ss>/<file>`.
//! Two runs started within the same second get a `_2`, `_3`, ... suffix on
//! the time folder instead of sharing a file.

use super::LogStore;
use crate::config::LogFileConfig;
use chrono::{DateTime, Local};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Give up looking for a free run folder after this many suffixes
const MAX_RUN_SUFFIX: u32 = 1_000;

/// Where log files for a configuration go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileLayout {
    pub base_directory: PathBuf,
    pub file_name: String,
}

impl From<&LogFileConfig> for LogFileLayout {
    fn from(config: &LogFileConfig) -> Self {
        Self::new(&config.base_directory, &config.file_name)
    }
}

impl LogFileLayout {
    pub fn new(base_directory: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            base_directory: base_directory.into(),
            file_name: file_name.into(),
        }
    }

    /// Run folder for a run started at `at` (without uniqueness suffix)
    pub fn run_directory(&self, at: &DateTime<Local>) -> PathBuf {
        self.base_directory
            .join(at.format("%Y").to_string())
            .join(at.format("%m_%b").to_string())
            .join(at.format("%m_%d").to_string())
            .join(at.format("%H_%M_%S").to_string())
    }

    /// Create a new log file for a run starting now
    pub fn create(&self) -> io::Result<FileLogStore> {
        self.create_at(&Local::now())
    }

    /// Create a new log file for a run starting at `at`
    pub fn create_at(&self, at: &DateTime<Local>) -> io::Result<FileLogStore> {
        let run_dir = self.run_directory(at);
        let mut candidate = run_dir.clone();
        let mut suffix = 1;

        while candidate.join(&self.file_name).exists() {
            suffix += 1;
            if suffix > MAX_RUN_SUFFIX {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("no free run folder under {}", run_dir.display()),
                ));
            }
            let name = format!(
                "{}_{}",
                run_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                suffix
            );
            candidate = run_dir.with_file_name(name);
        }

        fs::create_dir_all(&candidate)?;
        FileLogStore::open(candidate.join(&self.file_name))
    }
}

/// Append-mode log file with read sharing
pub struct FileLogStore {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl std::fmt::Debug for FileLogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLogStore")
            .field("path", &self.path)
            .field("open", &self.writer.is_some())
            .finish()
    }
}

impl FileLogStore {
    /// Open (or create) `path` for appending
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing::info!("Logging to {}", path.display());
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file already closed"))
    }
}

impl LogStore for FileLogStore {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let writer = self.writer()?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }

    fn finalize(&mut self) -> io::Result<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);

        let mut permissions = fs::metadata(&self.path)?.permissions();
        permissions.set_readonly(true);
        fs::set_permissions(&self.path, permissions)
    }
}
