//! In-memory job records
//!
//! Keyed by job id, with creation order kept so "latest job" does not depend
//! on clock resolution. Terminal records are frozen: updates to them are
//! refused.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::Job;

#[derive(Debug, Default)]
struct StoreInner {
    jobs: HashMap<String, Job>,
    order: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct JobStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, job: Job) {
        let mut inner = self.inner.write().await;
        if !inner.jobs.contains_key(&job.job_id) {
            inner.order.push(job.job_id.clone());
        }
        inner.jobs.insert(job.job_id.clone(), job);
    }

    pub async fn get(&self, job_id: &str) -> Option<Job> {
        self.inner.read().await.jobs.get(job_id).cloned()
    }

    /// Most recently created job
    pub async fn latest(&self) -> Option<Job> {
        let inner = self.inner.read().await;
        inner
            .order
            .last()
            .and_then(|id| inner.jobs.get(id))
            .cloned()
    }

    /// Jobs newest first, at most `limit`
    pub async fn recent(&self, limit: usize) -> Vec<Job> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .rev()
            .take(limit)
            .filter_map(|id| inner.jobs.get(id).cloned())
            .collect()
    }

    /// Apply `f` to a non-terminal job and return the updated record
    ///
    /// Returns `None` when the job is unknown or already terminal.
    pub async fn update<F>(&self, job_id: &str, f: F) -> Option<Job>
    where
        F: FnOnce(&mut Job),
    {
        let mut inner = self.inner.write().await;
        let job = inner.jobs.get_mut(job_id)?;
        if job.is_terminal() {
            tracing::warn!(job_id, state = %job.state, "Refusing to modify terminal job");
            return None;
        }
        f(job);
        Some(job.clone())
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobOptions, JobState};

    #[tokio::test]
    async fn test_latest_follows_insertion_order() {
        let store = JobStore::new();
        assert!(store.latest().await.is_none());

        let first = Job::new("one", JobOptions::default());
        let second = Job::new("two", JobOptions::default());
        let second_id = second.job_id.clone();
        store.insert(first).await;
        store.insert(second).await;

        assert_eq!(store.latest().await.map(|j| j.job_id), Some(second_id));
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_terminal_job_is_frozen() {
        let store = JobStore::new();
        let job = Job::new("p", JobOptions::default());
        let id = job.job_id.clone();
        store.insert(job).await;

        let updated = store.update(&id, |j| j.state = JobState::Failed).await;
        assert_eq!(updated.map(|j| j.state), Some(JobState::Failed));

        let refused = store.update(&id, |j| j.state = JobState::Running).await;
        assert!(refused.is_none());
        assert_eq!(store.get(&id).await.map(|j| j.state), Some(JobState::Failed));
    }

    #[tokio::test]
    async fn test_recent_is_newest_first() {
        let store = JobStore::new();
        for prompt in ["a", "b", "c"] {
            store.insert(Job::new(prompt, JobOptions::default())).await;
        }
        let prompts: Vec<String> = store.recent(2).await.into_iter().map(|j| j.prompt).collect();
        assert_eq!(prompts, vec!["c", "b"]);
    }
}
