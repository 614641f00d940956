//! Pipeline Orchestrator
//!
//! Sequences the stages of one run. Every execution claims a new run
//! directory, runs the stages in their fixed order, and writes
//! `run_report.json` exactly once when the run reaches a terminal status.
//!
//! Continue/abort policy:
//! - `degraded` stages let the pipeline continue
//! - after a `failed` stage only `docs` still runs
//! - cancellation is checked before each stage; nothing runs after it

use async_trait::async_trait;
use sdk::{EngineError, RunManifest, RunStatus, StageName, StageResult, StageStatus};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::stages::{default_stages, run_stage, Stage};
use super::{templates, CancelFlag, DiagnosticsSettings, RunWorkspace, StageContext};
use crate::config::PipelineConfig;
use crate::llm::router::{ProviderRouter, RoutingPolicy};

/// Per-run options
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub policy: RoutingPolicy,
    pub cancel: CancelFlag,
}

/// Progress hooks, called from the task executing the run
#[async_trait]
pub trait RunObserver: Send + Sync {
    async fn run_started(&self, _run_id: &str, _run_dir: &Path) {}

    async fn stage_started(&self, _run_id: &str, _stage: StageName) {}

    async fn stage_finished(&self, _run_id: &str, _result: &StageResult) {}
}

struct NoopObserver;

impl RunObserver for NoopObserver {}

/// A run that reached a terminal status and has its report on disk
#[derive(Debug, Clone)]
pub struct CompletedRun {
    pub run_dir: PathBuf,
    pub manifest: RunManifest,
}

pub struct Orchestrator {
    router: Arc<ProviderRouter>,
    runs_dir: PathBuf,
    diagnostics: DiagnosticsSettings,
    stages: Vec<Box<dyn Stage>>,
}

impl Orchestrator {
    pub fn new(
        router: Arc<ProviderRouter>,
        runs_dir: impl Into<PathBuf>,
        pipeline: &PipelineConfig,
    ) -> Self {
        Self {
            router,
            runs_dir: runs_dir.into(),
            diagnostics: DiagnosticsSettings::from(pipeline),
            stages: default_stages(),
        }
    }

    /// Replace the stage set; stages are kept in pipeline order
    pub fn with_stages(mut self, mut stages: Vec<Box<dyn Stage>>) -> Self {
        stages.sort_by_key(|s| s.name());
        stages.dedup_by_key(|s| s.name());
        self.stages = stages;
        self
    }

    pub fn router(&self) -> &Arc<ProviderRouter> {
        &self.router
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    /// Run the pipeline for a prompt to a terminal status
    pub async fn execute(
        &self,
        prompt: &str,
        options: RunOptions,
    ) -> Result<CompletedRun, EngineError> {
        self.execute_observed(prompt, options, &NoopObserver).await
    }

    /// Run the pipeline, reporting progress to `observer`
    ///
    /// Only failing to create the run directory or to write the report is an
    /// error; every stage problem ends up in the manifest instead.
    pub async fn execute_observed(
        &self,
        prompt: &str,
        options: RunOptions,
        observer: &dyn RunObserver,
    ) -> Result<CompletedRun, EngineError> {
        let workspace = RunWorkspace::create(&self.runs_dir, prompt)?;
        let run_id = workspace.run_id().to_string();
        let run_dir = workspace.root().to_path_buf();

        info!(run_id = %run_id, run_dir = %run_dir.display(), "Run started");
        observer.run_started(&run_id, &run_dir).await;

        let mut manifest = RunManifest::new(&run_id, prompt);
        manifest.commands = templates::run_commands(&run_dir);

        let mut ctx = StageContext::new(
            prompt,
            workspace,
            options.policy.clone(),
            self.diagnostics.clone(),
        );

        let mut failed_stage: Option<StageName> = None;
        let mut cancelled = false;

        for stage in &self.stages {
            let name = stage.name();

            if options.cancel.is_cancelled() {
                info!(run_id = %run_id, before = %name, "Run cancelled");
                cancelled = true;
                break;
            }

            if failed_stage.is_some() && name != StageName::Docs {
                info!(run_id = %run_id, stage = %name, "Skipping stage after failure");
                continue;
            }

            observer.stage_started(&run_id, name).await;
            let result = run_stage(stage.as_ref(), &ctx, &self.router).await;
            ctx.record(name, &result.artifacts);

            if result.status == StageStatus::Failed && failed_stage.is_none() {
                failed_stage = Some(name);
            }

            observer.stage_finished(&run_id, &result).await;
            manifest.stages.push(result);
        }

        let (status, summary) = if cancelled {
            (
                RunStatus::Cancelled,
                format!("Run cancelled after {} stage(s)", manifest.stages.len()),
            )
        } else {
            let status = manifest.stage_outcome();
            let summary = match (status, failed_stage) {
                (RunStatus::Failed, Some(stage)) => format!("Build failed at the {} stage", stage),
                (RunStatus::Degraded, _) => {
                    let degraded = manifest
                        .stages
                        .iter()
                        .filter(|s| s.status == StageStatus::Degraded)
                        .count();
                    format!(
                        "Full SDLC build completed with fallbacks in {} stage(s)",
                        degraded
                    )
                }
                _ => "Full SDLC build completed".to_string(),
            };
            (status, summary)
        };

        manifest.finish(status, summary);

        match ctx.workspace.write_report(&manifest) {
            Ok(path) => {
                info!(
                    run_id = %run_id,
                    status = %manifest.status,
                    report = %path.display(),
                    "Run finished"
                );
            }
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Failed to write run report");
                return Err(e);
            }
        }

        Ok(CompletedRun { run_dir, manifest })
    }
}
