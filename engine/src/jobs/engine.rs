//! Background execution of pipeline runs
//!
//! Each submitted job runs on its own tokio task once a concurrency permit is
//! available. The task is the only writer of its job record after `submit`,
//! with one exception: cancelling a job that is still queued finishes it on
//! the spot, and the task notices when it wakes.
//!
//! Cancellation and completion handles exist only while a job is live; a
//! finished job is answered from the store alone.

use async_trait::async_trait;
use chrono::Utc;
use sdk::{EngineError, RunManifest, RunStatus, StageName, StageResult};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, Semaphore};
use tracing::{debug, error, info, warn};

use super::{Job, JobOptions, JobState, JobStore, ReportQuery};
use crate::config::JobsConfig;
use crate::db::JobRepository;
use crate::pipeline::{load_report, CancelFlag, Orchestrator, RunObserver, RunOptions};

#[derive(Clone)]
struct JobHandle {
    cancel: CancelFlag,
    done: Arc<watch::Sender<bool>>,
}

pub struct JobEngine {
    orchestrator: Arc<Orchestrator>,
    store: JobStore,
    permits: Arc<Semaphore>,
    handles: Arc<Mutex<HashMap<String, JobHandle>>>,
    history: Option<Arc<JobRepository>>,
}

impl JobEngine {
    pub fn new(orchestrator: Arc<Orchestrator>, config: &JobsConfig) -> Self {
        Self {
            orchestrator,
            store: JobStore::new(),
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            handles: Arc::new(Mutex::new(HashMap::new())),
            history: None,
        }
    }

    /// Use an existing store instead of a fresh one
    pub fn with_store(mut self, store: JobStore) -> Self {
        self.store = store;
        self
    }

    /// Mirror terminal jobs and finished stages into the history database
    pub fn with_history(mut self, history: Arc<JobRepository>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Queue a run and return its job id immediately
    pub async fn submit(&self, prompt: impl Into<String>, options: JobOptions) -> String {
        let job = Job::new(prompt, options);
        let job_id = job.job_id.clone();

        let cancel = CancelFlag::new();
        let (done_tx, _) = watch::channel(false);
        let done = Arc::new(done_tx);

        self.handles.lock().await.insert(
            job_id.clone(),
            JobHandle {
                cancel: cancel.clone(),
                done: done.clone(),
            },
        );
        self.store.insert(job.clone()).await;
        info!(job_id = %job_id, "Job queued");

        let task = JobTask {
            job,
            cancel,
            done,
            orchestrator: self.orchestrator.clone(),
            store: self.store.clone(),
            permits: self.permits.clone(),
            handles: self.handles.clone(),
            history: self.history.clone(),
        };
        tokio::spawn(task.run());

        job_id
    }

    /// The job with `job_id`, or the most recently created one
    pub async fn status(&self, job_id: Option<&str>) -> Result<Job, EngineError> {
        match job_id {
            Some(id) => self
                .store
                .get(id)
                .await
                .ok_or_else(|| EngineError::JobNotFound(id.to_string())),
            None => self
                .store
                .latest()
                .await
                .ok_or_else(|| EngineError::JobNotFound("no jobs submitted".to_string())),
        }
    }

    /// The terminal manifest of a job's run, or of a run directory
    pub async fn report(&self, query: ReportQuery) -> Result<RunManifest, EngineError> {
        match query {
            ReportQuery::RunDir(dir) => load_report(&dir),
            ReportQuery::Job(id) => {
                let job = self.status(Some(&id)).await?;
                if !job.is_terminal() {
                    return Err(EngineError::RunIncomplete(format!(
                        "job {} is {}",
                        job.job_id, job.state
                    )));
                }
                match job.run_dir {
                    Some(dir) => load_report(&dir),
                    None => Err(EngineError::NoRunDirectory(job.job_id)),
                }
            }
        }
    }

    /// Request cancellation; a running job stops before its next stage
    pub async fn cancel(&self, job_id: &str) -> Result<(), EngineError> {
        let handle = self.handles.lock().await.get(job_id).cloned();
        let Some(handle) = handle else {
            // Finished jobs have dropped their handle; cancelling them is a no-op
            return self.status(Some(job_id)).await.map(|_| ());
        };

        handle.cancel.cancel();

        let cancelled_while_queued = self
            .store
            .update(job_id, |job| {
                if job.state == JobState::Queued {
                    job.state = JobState::Cancelled;
                    job.finished_at = Some(Utc::now());
                }
            })
            .await
            .map(|job| job.state == JobState::Cancelled)
            .unwrap_or(false);

        if cancelled_while_queued {
            info!(job_id, "Queued job cancelled");
            handle.done.send_replace(true);
        } else {
            info!(job_id, "Cancellation requested");
        }

        Ok(())
    }

    /// Wait until the job is terminal and return its final record
    pub async fn wait(&self, job_id: &str) -> Result<Job, EngineError> {
        let done = self
            .handles
            .lock()
            .await
            .get(job_id)
            .map(|h| h.done.subscribe());

        // The done flag is set before the handle is dropped, so a closed
        // channel still reads as finished
        if let Some(mut done) = done {
            let _ = done.wait_for(|finished| *finished).await;
        }

        self.status(Some(job_id)).await
    }

    /// Jobs of this session, newest first
    pub async fn recent(&self, limit: usize) -> Vec<Job> {
        self.store.recent(limit).await
    }

    /// Number of jobs still holding a live handle
    pub async fn live_jobs(&self) -> usize {
        self.handles.lock().await.len()
    }
}

struct JobTask {
    job: Job,
    cancel: CancelFlag,
    done: Arc<watch::Sender<bool>>,
    orchestrator: Arc<Orchestrator>,
    store: JobStore,
    permits: Arc<Semaphore>,
    handles: Arc<Mutex<HashMap<String, JobHandle>>>,
    history: Option<Arc<JobRepository>>,
}

impl JobTask {
    async fn run(self) {
        let job_id = self.job.job_id.clone();

        let _permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Job semaphore closed");
                self.finish(JobState::Failed, None, Some(e.to_string())).await;
                return;
            }
        };

        let started = if self.cancel.is_cancelled() {
            None
        } else {
            self.store
                .update(&job_id, |job| {
                    job.state = JobState::Running;
                    job.started_at = Some(Utc::now());
                })
                .await
        };
        if started.is_none() {
            self.finish(JobState::Cancelled, None, None).await;
            return;
        }
        info!(job_id = %job_id, "Job running");

        let observer = JobObserver {
            job_id: job_id.clone(),
            store: self.store.clone(),
            history: self.history.clone(),
        };
        let options = RunOptions {
            policy: self.job.options.policy(),
            cancel: self.cancel.clone(),
        };

        match self
            .orchestrator
            .execute_observed(&self.job.prompt, options, &observer)
            .await
        {
            Ok(run) => {
                let status = run.manifest.status;
                let error = (JobState::from(status) == JobState::Failed)
                    .then(|| run.manifest.summary.clone());
                self.finish(JobState::from(status), Some(status), error).await;
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Job failed before completing its run");
                // No report was written, so the directory is not a run to point at
                self.store
                    .update(&job_id, |job| job.run_dir = None)
                    .await;
                self.finish(JobState::Failed, None, Some(e.to_string())).await;
            }
        }
    }

    async fn finish(
        &self,
        state: JobState,
        run_status: Option<RunStatus>,
        error: Option<String>,
    ) {
        let job_id = &self.job.job_id;

        let updated = self
            .store
            .update(job_id, |job| {
                job.state = state;
                job.run_status = run_status;
                job.current_stage = None;
                job.error = error;
                job.finished_at = Some(Utc::now());
            })
            .await;

        // A queued job cancelled by `cancel` is already terminal
        let record = match updated {
            Some(job) => Some(job),
            None => self.store.get(job_id).await,
        };

        if let Some(job) = record {
            info!(job_id = %job_id, state = %job.state, "Job finished");
            if let Some(history) = &self.history {
                if let Err(e) = history.save_job(&job).await {
                    warn!(job_id = %job_id, error = %e, "Failed to persist job history");
                }
            }
        }

        self.done.send_replace(true);
        self.handles.lock().await.remove(job_id);
    }
}

/// Mirrors run progress into the job record
struct JobObserver {
    job_id: String,
    store: JobStore,
    history: Option<Arc<JobRepository>>,
}

#[async_trait]
impl RunObserver for JobObserver {
    async fn run_started(&self, run_id: &str, run_dir: &Path) {
        let run_id = run_id.to_string();
        let run_dir = run_dir.to_path_buf();
        self.store
            .update(&self.job_id, |job| {
                job.run_id = Some(run_id);
                job.run_dir = Some(run_dir);
            })
            .await;
    }

    async fn stage_started(&self, _run_id: &str, stage: StageName) {
        debug!(job_id = %self.job_id, stage = %stage, "Stage started");
        self.store
            .update(&self.job_id, |job| job.current_stage = Some(stage))
            .await;
    }

    async fn stage_finished(&self, run_id: &str, result: &StageResult) {
        self.store
            .update(&self.job_id, |job| job.stages_completed += 1)
            .await;

        if let Some(history) = &self.history {
            if let Err(e) = history
                .record_stage(run_id, Some(&self.job_id), result)
                .await
            {
                warn!(job_id = %self.job_id, error = %e, "Failed to record stage audit");
            }
        }
    }
}
