//! Forge Engine Library
//!
//! Turns a natural-language project prompt into a runnable project skeleton
//! by driving a fixed SDLC pipeline over a set of interchangeable generation
//! providers. It is used by both the `forge` binary and integration tests.

/// Configuration management module
pub mod config;

/// Provider credentials read from the environment
pub mod secrets;

/// Database persistence module
pub mod db;

/// Provider adapters, registry and router
pub mod llm;

/// Stages, orchestrator and run directories
pub mod pipeline;

/// Background jobs over the pipeline
pub mod jobs;

/// Single-shot prompt classification and routing
pub mod dispatch;

/// Command-line interface
pub mod cli;

/// Command handlers
pub mod handlers;

/// Logging setup
pub mod telemetry;
