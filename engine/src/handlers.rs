//! Command handlers for CLI operations
//!
//! - build: run the pipeline, in the foreground or as a polled job
//! - dispatch: answer a prompt with one routed call
//! - providers: list providers and their availability
//! - report: show a finished run's report
//! - history: show recent jobs from the history database

use anyhow::{Context, Result};
use chrono::Utc;
use sdk::{RunManifest, StageStatus};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::db::{Database, JobRepository, DATABASE_FILE};
use crate::dispatch::dispatch;
use crate::jobs::{Job, JobEngine, JobOptions, JobState, ReportQuery};
use crate::llm::registry::ProviderRegistry;
use crate::llm::router::ProviderRouter;
use crate::pipeline::{load_report, CancelFlag, Orchestrator, RunOptions};
use crate::secrets::CredentialStore;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Build the provider router from config and environment credentials
pub fn provider_router(config: &Config) -> Arc<ProviderRouter> {
    let credentials = CredentialStore::from_env(&config.providers);
    let registry = ProviderRegistry::from_config(
        &config.providers,
        &credentials,
        Duration::from_secs(config.router.request_timeout_secs),
    );
    Arc::new(ProviderRouter::new(Arc::new(registry), &config.router))
}

/// Open the history database; the CLI keeps working without it
async fn open_history(config: &Config) -> Option<Database> {
    let path = config.core.data_dir.join(DATABASE_FILE);
    match Database::new(&path).await {
        Ok(db) => Some(db),
        Err(e) => {
            tracing::warn!(error = %e, "History database unavailable, continuing without it");
            None
        }
    }
}

/// Run the full pipeline for a prompt
pub async fn handle_build(
    prompt: String,
    options: JobOptions,
    detach_poll: bool,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let router = provider_router(config);
    let orchestrator = Arc::new(Orchestrator::new(
        router,
        &config.core.runs_dir,
        &config.pipeline,
    ));
    let database = open_history(config).await;

    if let OutputFormat::Text = format {
        println!("Building: {}", prompt);
        println!();
    }

    let manifest = if detach_poll {
        build_as_job(prompt, options, orchestrator, database.as_ref(), config, format).await?
    } else {
        build_in_foreground(prompt, options, orchestrator, database.as_ref()).await?
    };

    if let Some(db) = database {
        db.close().await.ok();
    }

    let run_dir = config.core.runs_dir.join(&manifest.run_id);
    print_manifest(&manifest, &run_dir, format)
}

async fn build_in_foreground(
    prompt: String,
    options: JobOptions,
    orchestrator: Arc<Orchestrator>,
    database: Option<&Database>,
) -> Result<RunManifest> {
    let cancel = CancelFlag::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling before the next stage");
            on_interrupt.cancel();
        }
    });

    let mut job = Job::new(&prompt, options.clone());
    job.state = JobState::Running;
    job.started_at = Some(Utc::now());

    let result = orchestrator
        .execute(
            &prompt,
            RunOptions {
                policy: options.policy(),
                cancel,
            },
        )
        .await;
    interrupt.abort();

    let run = match result {
        Ok(run) => run,
        Err(e) => {
            job.state = JobState::Failed;
            job.error = Some(e.to_string());
            job.finished_at = Some(Utc::now());
            if let Some(db) = database {
                db.jobs().save_job(&job).await.ok();
            }
            return Err(e).context("Build could not start");
        }
    };

    job.state = JobState::from(run.manifest.status);
    job.run_status = Some(run.manifest.status);
    job.run_id = Some(run.manifest.run_id.clone());
    job.run_dir = Some(run.run_dir.clone());
    job.stages_completed = run.manifest.stages.len();
    job.finished_at = Some(Utc::now());
    if job.state == JobState::Failed {
        job.error = Some(run.manifest.summary.clone());
    }

    if let Some(db) = database {
        let repo = db.jobs();
        for stage in &run.manifest.stages {
            if let Err(e) = repo
                .record_stage(&run.manifest.run_id, Some(&job.job_id), stage)
                .await
            {
                tracing::warn!(error = %e, "Failed to record stage audit");
            }
        }
        if let Err(e) = repo.save_job(&job).await {
            tracing::warn!(error = %e, "Failed to save job history");
        }
    }

    Ok(run.manifest)
}

async fn build_as_job(
    prompt: String,
    options: JobOptions,
    orchestrator: Arc<Orchestrator>,
    database: Option<&Database>,
    config: &Config,
    format: OutputFormat,
) -> Result<RunManifest> {
    let mut engine = JobEngine::new(orchestrator, &config.jobs);
    if let Some(db) = database {
        engine = engine.with_history(Arc::new(db.jobs()));
    }

    let job_id = engine.submit(prompt, options).await;
    if let OutputFormat::Text = format {
        println!("Job {} submitted", job_id);
    }

    let mut last_stage = None;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = tokio::signal::ctrl_c() => {
                engine.cancel(&job_id).await?;
                if let OutputFormat::Text = format {
                    println!("Cancellation requested, waiting for the current stage");
                }
            }
        }

        let job = engine.status(Some(&job_id)).await?;
        if let OutputFormat::Text = format {
            if job.current_stage.is_some() && job.current_stage != last_stage {
                if let Some(stage) = job.current_stage {
                    println!("  [{}] {} ({} done)", job.state, stage, job.stages_completed);
                }
                last_stage = job.current_stage;
            }
        }

        if job.is_terminal() {
            if let Some(error) = job.error.as_deref().filter(|_| job.run_dir.is_none()) {
                anyhow::bail!("Job {} failed: {}", job.job_id, error);
            }
            break;
        }
    }

    engine
        .report(ReportQuery::Job(job_id))
        .await
        .context("Failed to load run report")
}

/// Answer a prompt with a single routed call
pub async fn handle_dispatch(
    prompt: String,
    free_only: bool,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let router = provider_router(config);
    let result = dispatch(&router, &prompt, free_only).await;

    match format {
        OutputFormat::Text => {
            println!("Kind:     {}", result.kind);
            println!("Tool:     {}", result.selected_tool);
            println!(
                "Provider: {} ({}){}",
                result.result.provider,
                result.result.model,
                if result.result.fallback {
                    " [fallback]"
                } else {
                    ""
                }
            );
            println!("Attempts: {}", result.outcome.total_attempts());
            println!();
            println!("{}", result.result.content);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}

/// List configured providers and whether they can be routed to
pub async fn handle_providers(config: &Config, format: OutputFormat) -> Result<()> {
    let router = provider_router(config);
    let specs = router.registry().specs();

    match format {
        OutputFormat::Text => {
            println!("Providers (highest priority first is tried first):");
            println!();
            for spec in &specs {
                let capabilities: Vec<String> =
                    spec.capabilities.iter().map(|c| c.to_string()).collect();
                println!(
                    "  {:<11} {:<11} priority {:>11}  {}{}  [{}]  {}",
                    spec.name,
                    if spec.is_available() {
                        "available"
                    } else {
                        "unavailable"
                    },
                    spec.priority,
                    if spec.paid { "paid" } else { "free" },
                    if spec.is_baseline() { " (baseline)" } else { "" },
                    capabilities.join(","),
                    spec.model,
                );
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "version": env!("CARGO_PKG_VERSION"),
                "commit": env!("GIT_COMMIT_HASH"),
                "providers": specs,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Show the report of a finished run
pub async fn handle_report(run_dir: PathBuf, format: OutputFormat) -> Result<()> {
    let manifest = load_report(&run_dir)
        .with_context(|| format!("Failed to load report from {}", run_dir.display()))?;
    print_manifest(&manifest, &run_dir, format)
}

/// Show recent jobs from the history database
pub async fn handle_history(limit: usize, config: &Config, format: OutputFormat) -> Result<()> {
    let path = config.core.data_dir.join(DATABASE_FILE);
    let database = Database::new(&path)
        .await
        .context("Failed to open database")?;
    let repo: JobRepository = database.jobs();

    let jobs = repo
        .recent_jobs(limit as i64)
        .await
        .context("Failed to fetch job history")?;

    match format {
        OutputFormat::Text => {
            if jobs.is_empty() {
                println!("No jobs in history");
                return Ok(());
            }

            println!("Job History (last {} jobs):", limit);
            println!();

            for job in &jobs {
                println!("Job ID: {}", job.id);
                println!("  Prompt: {}", job.prompt);
                println!(
                    "  State: {}{}",
                    job.state,
                    job.run_status
                        .as_deref()
                        .map(|s| format!(" ({})", s))
                        .unwrap_or_default()
                );
                if let Some(run_dir) = &job.run_dir {
                    println!("  Run: {}", run_dir);
                }
                if let Some(duration) = job.duration_ms {
                    println!("  Duration: {}ms", duration);
                }
                if let Some(error) = &job.error {
                    println!("  Error: {}", error);
                }

                let created = chrono::DateTime::from_timestamp(job.created_at, 0)
                    .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "Unknown".to_string());
                println!("  Created: {}", created);
                println!();
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "jobs": jobs,
                "count": jobs.len(),
                "limit": limit
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await.ok();
    Ok(())
}

fn print_manifest(manifest: &RunManifest, run_dir: &Path, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("Run {}: {}", manifest.run_id, manifest.status);
            println!("  {}", manifest.summary);
            println!("  Directory: {}", run_dir.display());
            println!();

            for stage in &manifest.stages {
                let mark = match stage.status {
                    StageStatus::Ok => "✓",
                    StageStatus::Degraded => "~",
                    StageStatus::Failed => "✗",
                };
                let providers: Vec<&str> =
                    stage.providers.iter().map(|p| p.provider.as_str()).collect();
                println!(
                    "  {} {:<12} {:<8} {} file(s)  via {}",
                    mark,
                    stage.stage,
                    stage.status,
                    stage.files_generated(),
                    providers.join(", ")
                );
                if let Some(error) = &stage.error {
                    println!("      {}", error);
                }
            }

            if !manifest.commands.is_empty() {
                println!();
                println!("Next steps:");
                for (name, commands) in &manifest.commands {
                    println!("  {}:", name);
                    for command in commands {
                        println!("    {}", command);
                    }
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(manifest)?);
        }
    }

    Ok(())
}
