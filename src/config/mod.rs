//! Configuration module for the port logger
//!
//! This module handles the resolved configuration a pipeline needs before it
//! starts:
//! - Which line source to read (serial device or TCP fallback listener)
//! - Where log files go and what they are called
//! - The console label used to pick a config file
//! - Supervisor timing and handoff sizing
//!
//! # Config Files
//!
//! Config files are TOML. A configs directory may hold one file per console;
//! [`PortLogConfig::find_by_console_name`] scans it recursively and picks the
//! file whose `display.console_name` matches.
//!
//! ```toml
//! [source]
//! kind = "serial"
//! port_name = "/dev/ttyUSB0"
//! baud_rate = 115200
//!
//! [log]
//! base_directory = "logs"
//! file_name = "sensor.txt"
//!
//! [display]
//! console_name = "Sensor A"
//! ```
//!
//! # Default Location
//!
//! Without an explicit directory, `./configs` is used when present, otherwise
//! the platform config directory:
//! - **Linux**: `~/.config/port-logger/configs/`
//! - **macOS**: `~/Library/Application Support/port-logger/configs/`
//! - **Windows**: `%APPDATA%\port-logger\configs\`

pub mod settings;

pub use settings::*;

use crate::error::{PortLogError, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for config directories
pub const APP_ID: &str = "port-logger";

/// Config file extension
pub const CONFIG_FILE_EXTENSION: &str = "toml";

/// Default serial port name
pub const DEFAULT_PORT_NAME: &str = "COM1";

/// Default baud rate
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default read/write timeout for sources in milliseconds
pub const DEFAULT_IO_TIMEOUT_MS: u64 = 500;

/// Default TCP fallback listen address
pub const DEFAULT_TCP_BIND: &str = "0.0.0.0:5000";

/// Default supervisor poll interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Default delay between reconnect attempts in milliseconds
pub const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 5_000;

/// Accepted baud rate range
pub const BAUD_RATE_RANGE: std::ops::RangeInclusive<u32> = 110..=4_000_000;

// ==================== Config Directory ====================

/// Platform config directory for port-logger configs
pub fn app_config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID).join("configs"))
}

/// Directory searched for config files when none is given
pub fn default_configs_dir() -> PathBuf {
    let local = PathBuf::from("configs");
    if local.is_dir() {
        return local;
    }
    app_config_dir().unwrap_or(local)
}

// ==================== Sections ====================

/// Serial device parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSourceConfig {
    /// Device name (`COM3`, `/dev/ttyUSB0`)
    pub port_name: String,
    pub baud_rate: u32,
    pub parity: Parity,
    pub data_bits: u8,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    /// Upper bound on a single read call
    pub read_timeout_ms: u64,
    /// Upper bound on a single outbound write
    pub write_timeout_ms: u64,
}

impl Default for SerialSourceConfig {
    fn default() -> Self {
        Self {
            port_name: DEFAULT_PORT_NAME.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            parity: Parity::None,
            data_bits: 8,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            read_timeout_ms: DEFAULT_IO_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_IO_TIMEOUT_MS,
        }
    }
}

impl SerialSourceConfig {
    /// Short `115200 8N1` style summary
    pub fn line_summary(&self) -> String {
        format!(
            "{} {}{}{}",
            self.baud_rate,
            self.data_bits,
            self.parity.letter(),
            self.stop_bits.count()
        )
    }
}

/// TCP fallback listener parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpSourceConfig {
    /// Address to listen on for a single client
    pub bind_address: String,
    /// How long one `open()` waits for a client before reporting unavailable
    pub accept_timeout_ms: u64,
    pub read_timeout_ms: u64,
}

impl Default for TcpSourceConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_TCP_BIND.to_string(),
            accept_timeout_ms: DEFAULT_IO_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_IO_TIMEOUT_MS,
        }
    }
}

/// Which byte source feeds the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    Serial(SerialSourceConfig),
    Tcp(TcpSourceConfig),
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Serial(SerialSourceConfig::default())
    }
}

impl SourceConfig {
    /// Port name or listen address
    pub fn identity(&self) -> &str {
        match self {
            SourceConfig::Serial(s) => &s.port_name,
            SourceConfig::Tcp(t) => &t.bind_address,
        }
    }

    pub fn read_timeout(&self) -> Duration {
        match self {
            SourceConfig::Serial(s) => Duration::from_millis(s.read_timeout_ms),
            SourceConfig::Tcp(t) => Duration::from_millis(t.read_timeout_ms),
        }
    }
}

/// Log file placement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogFileConfig {
    /// Root under which `<year>/<month>/<day>/<time-of-run>/` folders are made
    pub base_directory: PathBuf,
    /// File name inside the run folder
    pub file_name: String,
}

impl Default for LogFileConfig {
    fn default() -> Self {
        Self {
            base_directory: PathBuf::from("logs"),
            file_name: "log.txt".to_string(),
        }
    }
}

/// Console / display label
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Label used to select a config file and to title the console
    pub console_name: String,
}

/// Connection supervisor timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// How often the source's open state is checked
    pub poll_interval_ms: u64,
    /// Delay between failed reopen attempts
    pub reconnect_backoff_ms: u64,
    /// Start even if the first open fails, leaving it to the supervisor
    pub wait_for_source: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            reconnect_backoff_ms: DEFAULT_RECONNECT_BACKOFF_MS,
            wait_for_source: false,
        }
    }
}

impl SupervisorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}

/// Reader/writer handoff and observer queue sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Lines the reader may queue ahead of the writer
    pub handoff_capacity: usize,
    /// Longest single wait on a full or empty handoff before re-checking the stop flag
    pub handoff_wait_ms: u64,
    /// Observer events buffered before new ones are dropped
    pub event_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            handoff_capacity: 64,
            handoff_wait_ms: 100,
            event_capacity: 1024,
        }
    }
}

impl PipelineConfig {
    pub fn handoff_wait(&self) -> Duration {
        Duration::from_millis(self.handoff_wait_ms)
    }
}

// ==================== Top-level Config ====================

/// Complete configuration for one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortLogConfig {
    pub source: SourceConfig,
    pub log: LogFileConfig,
    pub display: DisplayConfig,
    pub supervisor: SupervisorConfig,
    pub pipeline: PipelineConfig,
}

impl PortLogConfig {
    /// Create a config with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PortLogError::ConfigInvalid(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        Self::from_toml_str(&content).map_err(|e| {
            PortLogError::ConfigInvalid(format!("Failed to parse config file {:?}: {}", path, e))
        })
    }

    /// Save the config to disk as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(PortLogError::from)
                    .with_context(|| format!("Failed to create config directory {:?}", parent))?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .map_err(PortLogError::from)
            .with_context(|| format!("Failed to write config {:?}", path))
    }

    /// Find the config whose console name matches (case-insensitive)
    ///
    /// Files that fail to parse are logged and skipped. Returns
    /// [`PortLogError::ConfigInvalid`] if nothing matches.
    pub fn find_by_console_name(dir: impl AsRef<Path>, console_name: &str) -> Result<Self> {
        let dir = dir.as_ref();
        let mut files = Vec::new();
        collect_config_files(dir, &mut files);
        files.sort();

        for path in files {
            tracing::debug!("Checking config {:?}", path);
            match Self::load(&path) {
                Ok(config) => {
                    if config
                        .display
                        .console_name
                        .eq_ignore_ascii_case(console_name.trim())
                    {
                        tracing::info!("Using config {:?} for console '{}'", path, console_name);
                        return Ok(config);
                    }
                }
                Err(e) => tracing::warn!("Skipping config {:?}: {}", path, e),
            }
        }

        Err(PortLogError::ConfigInvalid(format!(
            "No configuration found for console name '{}' in {:?}",
            console_name, dir
        )))
    }

    /// Check the config can drive a pipeline
    pub fn validate(&self) -> Result<()> {
        match &self.source {
            SourceConfig::Serial(serial) => {
                if serial.port_name.trim().is_empty() {
                    return invalid("serial port name is empty");
                }
                if !BAUD_RATE_RANGE.contains(&serial.baud_rate) {
                    return invalid(format!(
                        "baud rate {} outside {}..={}",
                        serial.baud_rate,
                        BAUD_RATE_RANGE.start(),
                        BAUD_RATE_RANGE.end()
                    ));
                }
                if to_serialport_data_bits(serial.data_bits).is_none() {
                    return invalid(format!("data bits {} outside 5..=8", serial.data_bits));
                }
                if serial.read_timeout_ms == 0 || serial.write_timeout_ms == 0 {
                    return invalid("serial timeouts must be non-zero");
                }
            }
            SourceConfig::Tcp(tcp) => {
                if tcp.bind_address.parse::<SocketAddr>().is_err() {
                    return invalid(format!("bind address '{}' is not host:port", tcp.bind_address));
                }
                if tcp.read_timeout_ms == 0 || tcp.accept_timeout_ms == 0 {
                    return invalid("tcp timeouts must be non-zero");
                }
            }
        }

        if self.log.base_directory.as_os_str().is_empty() {
            return invalid("log base directory is empty");
        }
        let name = self.log.file_name.trim();
        if name.is_empty() {
            return invalid("log file name is empty");
        }
        if name.contains(['/', '\\']) || name == "." || name == ".." {
            return invalid(format!("log file name '{}' must not contain a path", name));
        }

        if self.supervisor.poll_interval_ms == 0 || self.supervisor.reconnect_backoff_ms == 0 {
            return invalid("supervisor intervals must be non-zero");
        }
        if self.pipeline.handoff_capacity == 0 {
            return invalid("handoff capacity must be at least 1");
        }
        if self.pipeline.handoff_wait_ms == 0 {
            return invalid("handoff wait must be non-zero");
        }
        if self.pipeline.event_capacity == 0 {
            return invalid("event capacity must be at least 1");
        }

        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> Result<()> {
    Err(PortLogError::ConfigInvalid(msg.into()))
}

fn collect_config_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Error searching for config files in {:?}: {}", dir, e);
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_config_files(&path, out);
        } else if path.extension().and_then(|e| e.to_str()) == Some(CONFIG_FILE_EXTENSION) {
            out.push(path);
        }
    }
}

// ==================== Tests ====================
