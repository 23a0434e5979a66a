//! Error handling for the port logger
//!
//! This module defines the error taxonomy shared by the line sources, the log
//! sink and the pipeline tasks, plus a Result alias for use throughout the
//! crate.
//!
//! # Propagation
//!
//! - [`PortLogError::ReadTimeout`] is absorbed by the reader loop
//! - [`PortLogError::SourceDisconnected`] and [`PortLogError::SourceUnavailable`]
//!   are absorbed by the connection supervisor
//! - [`PortLogError::WriteFailure`], [`PortLogError::SinkSealed`] and
//!   [`PortLogError::ConfigInvalid`] stop the pipeline and reach the operator

use thiserror::Error;

/// Main error type for port logger operations
#[derive(Error, Debug)]
pub enum PortLogError {
    /// The device or address could not be acquired (not found, busy, denied)
    #[error("Source unavailable ({identity}): {reason}")]
    SourceUnavailable { identity: String, reason: String },

    /// No complete line arrived within the read timeout
    #[error("Read timed out")]
    ReadTimeout,

    /// The source dropped while reading; the handle must be reopened
    #[error("Source disconnected ({identity}): {reason}")]
    SourceDisconnected { identity: String, reason: String },

    /// Appending to the log artifact failed
    #[error("Log write failed ({location}): {source}")]
    WriteFailure {
        location: String,
        #[source]
        source: std::io::Error,
    },

    /// An append was attempted after the sink was sealed
    #[error("Log sink already sealed ({0})")]
    SinkSealed(String),

    /// Configuration was rejected before the pipeline started
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PortLogError>,
    },
}

impl PortLogError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PortLogError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Shorthand for a [`PortLogError::SourceUnavailable`]
    pub fn unavailable(identity: impl Into<String>, reason: impl ToString) -> Self {
        PortLogError::SourceUnavailable {
            identity: identity.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for a [`PortLogError::SourceDisconnected`]
    pub fn disconnected(identity: impl Into<String>, reason: impl ToString) -> Self {
        PortLogError::SourceDisconnected {
            identity: identity.into(),
            reason: reason.to_string(),
        }
    }

    /// Innermost error, skipping any context wrappers
    pub fn root(&self) -> &PortLogError {
        match self {
            PortLogError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this error must stop the whole pipeline
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.root(),
            PortLogError::WriteFailure { .. }
                | PortLogError::SinkSealed(_)
                | PortLogError::ConfigInvalid(_)
        )
    }
}

impl From<toml::de::Error> for PortLogError {
    fn from(err: toml::de::Error) -> Self {
        PortLogError::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for PortLogError {
    fn from(err: toml::ser::Error) -> Self {
        PortLogError::Serialization(err.to_string())
    }
}

/// Result type alias for port logger operations
pub type Result<T> = std::result::Result<T, PortLogError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
