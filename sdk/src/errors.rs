//! Error types and handling
//!
//! This module provides the error types surfaced by the Forge engine to its
//! callers. All errors implement the `ForgeErrorExt` trait which provides
//! user-friendly hints and indicates whether errors are recoverable.
//!
//! Provider failures and stage failures never reach this type: the router
//! absorbs the former and the orchestrator turns the latter into report data.

use std::path::PathBuf;
use thiserror::Error;

/// Trait for Forge error extensions
pub trait ForgeErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and never contains
    /// credentials or provider response bodies.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around. Non-recoverable
    /// errors typically require manual intervention.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Database**: SQLite history failures
/// - **Jobs**: Unknown job ids, reports requested before a run is terminal
/// - **Runs**: Run directory creation and artifact path validation
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, ForgeErrorExt};
///
/// let error = EngineError::JobNotFound("1234".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal = EngineError::RunDirectory("/ro/runs".into(), "read-only".to_string());
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // Job engine errors
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Run has not reached a terminal state: {0}")]
    RunIncomplete(String),

    #[error("Run report not found at {0:?}")]
    RunNotFound(PathBuf),

    // Run directory errors
    #[error("Failed to create run directory {0:?}: {1}")]
    RunDirectory(PathBuf, String),

    #[error("Job {0} ended before a run directory was created")]
    NoRunDirectory(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl ForgeErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Database(_) => "History database unavailable. Check the data directory",

            Self::JobNotFound(_) => "No job with that id. Use 'forge history' to list jobs",
            Self::RunIncomplete(_) => "The run is still in progress. Poll again later",
            Self::RunNotFound(_) => "No run report at that location",

            Self::RunDirectory(_, _) => "Runs directory is not writable. Check runs_dir",
            Self::NoRunDirectory(_) => "The job failed before writing anything. See its error",

            Self::Serialization(_) => "Run report is malformed",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::RunDirectory(_, _) | Self::Config(_))
    }
}
