//! Job Engine
//!
//! Runs pipeline executions as background jobs that clients can poll,
//! cancel and wait on. Job records live in an injected `JobStore`; after a
//! job is submitted, only the task executing it writes to its record.

use chrono::{DateTime, Utc};
use sdk::{RunStatus, StageName};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::llm::router::RoutingPolicy;

pub mod engine;
pub mod store;

pub use engine::JobEngine;
pub use store::JobStore;

/// Lifecycle of a job: `queued -> running -> {succeeded, failed, cancelled}`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(JobState::Queued),
            "running" => Some(JobState::Running),
            "succeeded" => Some(JobState::Succeeded),
            "failed" => Some(JobState::Failed),
            "cancelled" => Some(JobState::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Degraded runs still delivered a project, so the job succeeded
impl From<RunStatus> for JobState {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Running => JobState::Running,
            RunStatus::Succeeded | RunStatus::Degraded => JobState::Succeeded,
            RunStatus::Failed => JobState::Failed,
            RunStatus::Cancelled => JobState::Cancelled,
        }
    }
}

/// Options accepted by `JobEngine::submit`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobOptions {
    #[serde(default)]
    pub free_only: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub providers_filter: Option<Vec<String>>,
}

impl JobOptions {
    pub fn policy(&self) -> RoutingPolicy {
        RoutingPolicy {
            free_only: self.free_only,
            providers_filter: self.providers_filter.clone().filter(|f| !f.is_empty()),
        }
    }
}

/// What `JobEngine::report` looks up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportQuery {
    Job(String),
    RunDir(PathBuf),
}

/// The pollable record of one background run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub job_id: String,
    pub prompt: String,
    pub state: JobState,

    /// Set once the run directory exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_dir: Option<PathBuf>,

    /// Stage currently executing, while running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<StageName>,

    #[serde(default)]
    pub stages_completed: usize,

    /// Aggregate run status once terminal, e.g. `degraded`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_status: Option<RunStatus>,

    pub options: JobOptions,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Why the job failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    pub fn new(prompt: impl Into<String>, options: JobOptions) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            prompt: prompt.into(),
            state: JobState::Queued,
            run_id: None,
            run_dir: None,
            current_stage: None,
            stages_completed: 0,
            run_status: None,
            options,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Wall-clock duration of a finished job
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}
