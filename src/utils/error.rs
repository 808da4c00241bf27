//! Error types for the entire application.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs and commands.
//!
//! Several of these never escape a pipeline run: a decode failure becomes
//! "no content", a record failure ends that archive's stream, a sink
//! rejection drops one record and a render failure is only logged.

use thiserror::Error;

/// Errors that can occur while deserializing one record unit
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Pickle deserialization failed: {0}")]
    Pickle(#[from] serde_pickle::Error),
}

/// Errors raised by a report sink when it refuses a record
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Duplicate timestamp: {0}")]
    DuplicateTimestamp(String),

    #[error("Record has no timestamp")]
    MissingTimestamp,

    #[error("Failed to persist report: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while writing fold files
#[derive(Error, Debug)]
pub enum FoldError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),
}

/// Errors that can occur during the flamegraph render step
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("SVG generation failed: {0}")]
    Svg(String),

    #[error("Render command `{command}` exited with {status}")]
    ToolFailed { command: String, status: String },
}

/// Errors that can occur during file output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),
}

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
