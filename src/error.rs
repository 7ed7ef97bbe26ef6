//! Error types for streamviz.
//!
//! Nothing in the ingest pipeline is fatal: a missing log file, a rotation or
//! a malformed payload all degrade locally. The variants here cover the
//! places where a failure has to reach the operator: configuration, terminal
//! setup and exports.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for streamviz operations.
#[derive(Debug, Error)]
pub enum StreamvizError {
    /// Configuration parsing error with line number.
    #[error("configuration error at line {line}: {message}")]
    ConfigParse {
        /// Line number where the error occurred (1-indexed).
        line: usize,
        /// Error message describing the issue.
        message: String,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {0}")]
    ConfigNotFound(String),

    /// Invalid configuration value.
    #[error("invalid configuration value for '{key}': {message}")]
    ConfigInvalid {
        /// The configuration key with invalid value.
        key: String,
        /// Error message describing why the value is invalid.
        message: String,
    },

    /// Terminal initialization or rendering error.
    #[error("terminal error: {0}")]
    TerminalError(#[from] io::Error),

    /// Writing an exported stream failed.
    #[error("export to {} failed: {source}", path.display())]
    ExportFailed {
        /// Destination that could not be written.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The requested stream is no longer held by the aggregator.
    #[error("stream {0} is no longer available")]
    StreamGone(String),

    /// Diagnostic logging could not be initialized.
    #[error("debug log setup failed: {0}")]
    LogSetup(String),
}

/// Result type alias for streamviz operations.
pub type Result<T> = std::result::Result<T, StreamvizError>;
