//! Run report types
//!
//! These types form the `run_report.json` contract written at the end of
//! every pipeline run. Tooling outside the engine (diagnostics runners,
//! docs builders, packaging) reads them, so field names are stable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// File name of the terminal report inside a run directory
pub const RUN_REPORT_FILE: &str = "run_report.json";

/// One phase of the delivery pipeline, in execution order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
    Requirements,
    Design,
    Build,
    Test,
    Deploy,
    Docs,
}

impl StageName {
    /// All stages in their fixed execution order
    pub const ALL: [StageName; 6] = [
        StageName::Requirements,
        StageName::Design,
        StageName::Build,
        StageName::Test,
        StageName::Deploy,
        StageName::Docs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Requirements => "requirements",
            StageName::Design => "design",
            StageName::Build => "build",
            StageName::Test => "test",
            StageName::Deploy => "deploy",
            StageName::Docs => "docs",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Outcome of a single stage
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    /// Stage produced its preferred artifacts
    Ok,
    /// Stage fell back to a minimal scaffold but left valid artifacts
    Degraded,
    /// Stage could not produce its artifacts
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Ok => "ok",
            StageStatus::Degraded => "degraded",
            StageStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Which provider answered one generation request made by a stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderAttribution {
    /// What the stage asked for (e.g. "requirements", "backend")
    pub purpose: String,

    /// Provider that produced the response
    pub provider: String,

    /// Model reported by the provider
    pub model: String,

    /// True when the local baseline answered
    pub fallback: bool,

    /// Number of provider attempts the router made for this request
    pub attempts: usize,
}

/// Result of one stage execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: StageName,
    pub status: StageStatus,

    /// Artifact paths relative to the run root, forward-slash separated
    pub artifacts: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default)]
    pub providers: Vec<ProviderAttribution>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl StageResult {
    pub fn files_generated(&self) -> usize {
        self.artifacts.len()
    }
}

/// Aggregate status of a run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Succeeded,
    Degraded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Degraded => "degraded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// The record of one pipeline execution
///
/// Created when the run directory exists, appended to after every stage,
/// and written to `run_report.json` once the run reaches a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub prompt: String,
    pub status: RunStatus,
    pub stages: Vec<StageResult>,
    pub started_at: DateTime<Utc>,

    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub summary: String,

    /// How to set up, run, test and deploy the generated project
    #[serde(default)]
    pub commands: BTreeMap<String, Vec<String>>,
}

impl RunManifest {
    pub fn new(run_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            prompt: prompt.into(),
            status: RunStatus::Running,
            stages: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
            summary: String::new(),
            commands: BTreeMap::new(),
        }
    }

    pub fn stage(&self, name: StageName) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.stage == name)
    }

    /// Status implied by the recorded stages alone
    ///
    /// Any failed stage wins over degraded ones; an empty run counts as
    /// succeeded.
    pub fn stage_outcome(&self) -> RunStatus {
        if self.stages.iter().any(|s| s.status == StageStatus::Failed) {
            RunStatus::Failed
        } else if self.stages.iter().any(|s| s.status == StageStatus::Degraded) {
            RunStatus::Degraded
        } else {
            RunStatus::Succeeded
        }
    }

    /// Strictly increasing stage order with no repeats
    pub fn stages_in_order(&self) -> bool {
        self.stages.windows(2).all(|w| w[0].stage < w[1].stage)
    }

    /// Move the manifest into its terminal status
    pub fn finish(&mut self, status: RunStatus, summary: impl Into<String>) {
        self.status = status;
        self.summary = summary.into();
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(stage: StageName, status: StageStatus) -> StageResult {
        StageResult {
            stage,
            status,
            artifacts: vec![],
            error: None,
            providers: vec![],
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_stage_order_matches_declaration() {
        let mut sorted = StageName::ALL;
        sorted.sort();
        assert_eq!(sorted, StageName::ALL);
    }

    #[test]
    fn test_stage_outcome_failed_overrides_degraded() {
        let mut manifest = RunManifest::new("r", "p");
        manifest.stages.push(result(StageName::Requirements, StageStatus::Degraded));
        assert_eq!(manifest.stage_outcome(), RunStatus::Degraded);

        manifest.stages.push(result(StageName::Build, StageStatus::Failed));
        assert_eq!(manifest.stage_outcome(), RunStatus::Failed);
    }

    #[test]
    fn test_stages_in_order_rejects_repeats() {
        let mut manifest = RunManifest::new("r", "p");
        manifest.stages.push(result(StageName::Design, StageStatus::Ok));
        manifest.stages.push(result(StageName::Design, StageStatus::Ok));
        assert!(!manifest.stages_in_order());
    }

    #[test]
    fn test_manifest_json_field_names() {
        let mut manifest = RunManifest::new("20240101-000000-todo", "todo");
        manifest.finish(RunStatus::Succeeded, "done");
        let json = serde_json::to_value(&manifest).unwrap();

        for key in ["run_id", "status", "stages", "started_at", "finished_at"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["status"], "succeeded");
    }
}
