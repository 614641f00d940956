//! Delivery pipeline
//!
//! Drives one task prompt through the fixed stage sequence (requirements,
//! design, build, test, deploy, docs) and materializes the artifacts under a
//! fresh run directory. The orchestrator owns sequencing and the run report;
//! each stage owns its artifact paths; the router owns provider selection.

use crate::llm::router::RoutingPolicy;
use sdk::StageName;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub mod diagnostics;
pub mod orchestrator;
pub mod stages;
pub mod templates;
pub mod workspace;

pub use orchestrator::{CompletedRun, Orchestrator, RunObserver, RunOptions};
pub use workspace::{load_report, RunWorkspace};

/// Errors a stage can end with
///
/// The orchestrator turns these into a `failed` StageResult; they never
/// abort the pipeline on their own.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// Writing an artifact failed, or an artifact path left the run directory
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generated content was invalid and no scaffold could stand in for it
    #[error("Unrecoverable generated content: {0}")]
    UnrecoverableContent(String),
}

/// Cooperative cancellation flag shared between a job handle and its run
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Diagnostics settings resolved from `[pipeline]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticsSettings {
    pub enabled: bool,
    pub timeout: Duration,
}

impl From<&crate::config::PipelineConfig> for DiagnosticsSettings {
    fn from(config: &crate::config::PipelineConfig) -> Self {
        Self {
            enabled: config.run_diagnostics,
            timeout: Duration::from_secs(config.diagnostics_timeout_secs),
        }
    }
}

/// What a stage sees: the task, where to write, and what came before
#[derive(Debug)]
pub struct StageContext {
    /// The user's original task description
    pub prompt: String,

    pub workspace: RunWorkspace,

    pub policy: RoutingPolicy,

    pub diagnostics: DiagnosticsSettings,

    /// Artifacts written by earlier stages, by stage
    artifacts: BTreeMap<StageName, Vec<String>>,
}

impl StageContext {
    pub fn new(
        prompt: impl Into<String>,
        workspace: RunWorkspace,
        policy: RoutingPolicy,
        diagnostics: DiagnosticsSettings,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            workspace,
            policy,
            diagnostics,
            artifacts: BTreeMap::new(),
        }
    }

    pub fn artifacts_of(&self, stage: StageName) -> &[String] {
        self.artifacts
            .get(&stage)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn has_artifact(&self, path: &str) -> bool {
        self.artifacts.values().any(|paths| paths.iter().any(|p| p == path))
    }

    /// Short listing of everything generated so far, for prompts
    pub fn artifact_index(&self) -> String {
        self.artifacts
            .iter()
            .flat_map(|(stage, paths)| paths.iter().map(move |p| format!("- [{}] {}", stage, p)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub(crate) fn record(&mut self, stage: StageName, paths: &[String]) {
        self.artifacts
            .entry(stage)
            .or_default()
            .extend(paths.iter().cloned());
    }
}
