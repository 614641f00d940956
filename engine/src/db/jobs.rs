/// Job history persistence
///
/// Terminal job records and one audit row per finished stage. All queries
/// are parameterized.
use anyhow::{Context, Result};
use chrono::Utc;
use sdk::StageResult;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use crate::jobs::{Job, JobState};

/// A job as stored in history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobHistoryEntry {
    pub id: String,
    pub prompt: String,
    pub state: JobState,
    pub run_id: Option<String>,
    pub run_dir: Option<String>,
    pub run_status: Option<String>,
    pub free_only: bool,
    pub error: Option<String>,
    pub duration_ms: Option<i64>,
    pub created_at: i64,
    pub finished_at: Option<i64>,
}

/// One finished stage as recorded in the audit log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageAuditEntry {
    pub run_id: String,
    pub job_id: Option<String>,
    pub stage: String,
    pub status: String,
    /// Names of the providers that answered the stage's requests
    pub providers: Vec<String>,
    pub files_generated: i64,
    pub error: Option<String>,
    pub created_at: i64,
}

pub struct JobRepository {
    pool: SqlitePool,
}

impl JobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a job record
    pub async fn save_job(&self, job: &Job) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO jobs \
             (id, prompt, state, run_id, run_dir, run_status, free_only, error, duration_ms, created_at, finished_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&job.job_id)
        .bind(&job.prompt)
        .bind(job.state.as_str())
        .bind(job.run_id.as_deref())
        .bind(job.run_dir.as_ref().map(|p| p.display().to_string()))
        .bind(job.run_status.map(|s| s.as_str()))
        .bind(job.options.free_only)
        .bind(job.error.as_deref())
        .bind(job.duration_ms())
        .bind(job.created_at.timestamp())
        .bind(job.finished_at.map(|t| t.timestamp()))
        .execute(&self.pool)
        .await
        .context("Failed to save job")?;

        Ok(())
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<JobHistoryEntry>> {
        let row = sqlx::query(
            "SELECT id, prompt, state, run_id, run_dir, run_status, free_only, error, duration_ms, created_at, finished_at \
             FROM jobs WHERE id = ?",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch job")?;

        Ok(row.map(|r| job_from_row(&r)))
    }

    /// Most recent jobs first
    pub async fn recent_jobs(&self, limit: i64) -> Result<Vec<JobHistoryEntry>> {
        let rows = sqlx::query(
            "SELECT id, prompt, state, run_id, run_dir, run_status, free_only, error, duration_ms, created_at, finished_at \
             FROM jobs ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch recent jobs")?;

        Ok(rows.iter().map(job_from_row).collect())
    }

    /// Append the audit row for a finished stage
    pub async fn record_stage(
        &self,
        run_id: &str,
        job_id: Option<&str>,
        result: &StageResult,
    ) -> Result<()> {
        let providers: Vec<&str> = result
            .providers
            .iter()
            .map(|p| p.provider.as_str())
            .collect();
        let providers = serde_json::to_string(&providers)?;

        sqlx::query(
            "INSERT INTO stage_audit (run_id, job_id, stage, status, providers, files_generated, error, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(run_id)
        .bind(job_id)
        .bind(result.stage.as_str())
        .bind(result.status.as_str())
        .bind(providers)
        .bind(result.files_generated() as i64)
        .bind(result.error.as_deref())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .context("Failed to record stage audit")?;

        Ok(())
    }

    /// Audit rows of a run in the order they were recorded
    pub async fn stage_audit(&self, run_id: &str) -> Result<Vec<StageAuditEntry>> {
        let rows = sqlx::query(
            "SELECT run_id, job_id, stage, status, providers, files_generated, error, created_at \
             FROM stage_audit WHERE run_id = ? ORDER BY id ASC",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch stage audit")?;

        Ok(rows
            .iter()
            .map(|r| StageAuditEntry {
                run_id: r.get("run_id"),
                job_id: r.get("job_id"),
                stage: r.get("stage"),
                status: r.get("status"),
                providers: serde_json::from_str(&r.get::<String, _>("providers"))
                    .unwrap_or_default(),
                files_generated: r.get("files_generated"),
                error: r.get("error"),
                created_at: r.get("created_at"),
            })
            .collect())
    }
}

fn job_from_row(r: &sqlx::sqlite::SqliteRow) -> JobHistoryEntry {
    JobHistoryEntry {
        id: r.get("id"),
        prompt: r.get("prompt"),
        state: JobState::parse(&r.get::<String, _>("state")).unwrap_or(JobState::Failed),
        run_id: r.get("run_id"),
        run_dir: r.get("run_dir"),
        run_status: r.get("run_status"),
        free_only: r.get("free_only"),
        error: r.get("error"),
        duration_ms: r.get("duration_ms"),
        created_at: r.get("created_at"),
        finished_at: r.get("finished_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::jobs::JobOptions;
    use sdk::{ProviderAttribution, StageName, StageStatus};
    use tempfile::TempDir;

    async fn repo() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(&dir.path().join("forge.db")).await.unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn test_save_and_get_job() {
        let (_dir, db) = repo().await;
        let jobs = db.jobs();

        let mut job = Job::new("build a todo app", JobOptions::default());
        job.state = JobState::Succeeded;
        job.run_id = Some("20240101-000000-build-a-todo-app".to_string());
        job.finished_at = Some(Utc::now());
        jobs.save_job(&job).await.unwrap();

        let stored = jobs.get_job(&job.job_id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Succeeded);
        assert_eq!(stored.run_id, job.run_id);
        assert!(!stored.free_only);

        assert!(jobs.get_job("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_job_replaces_existing() {
        let (_dir, db) = repo().await;
        let jobs = db.jobs();

        let mut job = Job::new("p", JobOptions::default());
        jobs.save_job(&job).await.unwrap();
        job.state = JobState::Failed;
        job.error = Some("runs dir read-only".to_string());
        jobs.save_job(&job).await.unwrap();

        let recent = jobs.recent_jobs(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].state, JobState::Failed);
        assert_eq!(recent[0].error.as_deref(), Some("runs dir read-only"));
    }

    #[tokio::test]
    async fn test_stage_audit_round_trip() {
        let (_dir, db) = repo().await;
        let jobs = db.jobs();

        let result = StageResult {
            stage: StageName::Build,
            status: StageStatus::Degraded,
            artifacts: vec!["backend/main.py".into(), "frontend/package.json".into()],
            error: None,
            providers: vec![ProviderAttribution {
                purpose: "backend".into(),
                provider: "baseline".into(),
                model: "templated".into(),
                fallback: true,
                attempts: 1,
            }],
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };
        jobs.record_stage("run-1", Some("job-1"), &result)
            .await
            .unwrap();

        let audit = jobs.stage_audit("run-1").await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].stage, "build");
        assert_eq!(audit[0].status, "degraded");
        assert_eq!(audit[0].providers, vec!["baseline".to_string()]);
        assert_eq!(audit[0].files_generated, 2);
    }
}
