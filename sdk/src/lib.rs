//! Forge SDK
//!
//! Shared error and report types. The engine produces them; tooling that
//! reads `run_report.json` consumes them.

/// Error types and handling
pub mod errors;

/// Run report types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, ForgeErrorExt};
pub use types::{
    ProviderAttribution, RunManifest, RunStatus, StageName, StageResult, StageStatus,
    RUN_REPORT_FILE,
};
