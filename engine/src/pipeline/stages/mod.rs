//! Stage executors
//!
//! Each stage turns the task context into a set of files under the run
//! directory. Stages ask the router for content and fall back to templates
//! when the content is unusable; they only fail when writing to disk fails
//! or a guaranteed file is still missing afterwards.

use async_trait::async_trait;
use chrono::Utc;
use sdk::{ProviderAttribution, StageName, StageResult, StageStatus};
use tracing::{info, warn};

use super::{StageContext, StageError};
use crate::llm::router::ProviderRouter;
use crate::llm::{ProviderRequest, ProviderResponse};

pub mod build;
pub mod deploy;
pub mod design;
pub mod docs;
pub mod requirements;
pub mod testing;

pub use build::BuildStage;
pub use deploy::DeployStage;
pub use design::DesignStage;
pub use docs::DocsStage;
pub use requirements::RequirementsStage;
pub use testing::TestStage;

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> StageName;

    async fn run(
        &self,
        ctx: &StageContext,
        router: &ProviderRouter,
        output: &mut StageOutput,
    ) -> Result<(), StageError>;
}

/// The stages in their fixed execution order
pub fn default_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(RequirementsStage),
        Box::new(DesignStage),
        Box::new(BuildStage),
        Box::new(TestStage),
        Box::new(DeployStage),
        Box::new(DocsStage),
    ]
}

/// What a stage produced, accumulated while it runs
#[derive(Debug, Default)]
pub struct StageOutput {
    pub artifacts: Vec<String>,
    pub providers: Vec<ProviderAttribution>,
    /// Set when any content came from the baseline or a template
    pub degraded: bool,
}

impl StageOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a request and record who answered it
    pub async fn generate(
        &mut self,
        router: &ProviderRouter,
        ctx: &StageContext,
        purpose: &str,
        request: ProviderRequest,
    ) -> ProviderResponse {
        let request = request.with_subject(ctx.prompt.as_str());
        let (response, outcome) = router.route(&request, &ctx.policy).await;

        if response.fallback {
            self.degraded = true;
        }
        self.providers.push(ProviderAttribution {
            purpose: purpose.to_string(),
            provider: response.provider.clone(),
            model: response.model.clone(),
            fallback: response.fallback,
            attempts: outcome.attempts.len(),
        });

        response
    }

    /// Write an artifact and record its path
    pub fn write(
        &mut self,
        ctx: &StageContext,
        relative: &str,
        contents: &str,
    ) -> Result<(), StageError> {
        let path = ctx.workspace.write_file(relative, contents)?;
        if !self.artifacts.contains(&path) {
            self.artifacts.push(path);
        }
        Ok(())
    }

    /// Write a template file, marking the stage degraded
    pub fn write_fallback(
        &mut self,
        ctx: &StageContext,
        relative: &str,
        contents: &str,
    ) -> Result<(), StageError> {
        self.degraded = true;
        self.write(ctx, relative, contents)
    }

    pub fn status(&self) -> StageStatus {
        if self.degraded {
            StageStatus::Degraded
        } else {
            StageStatus::Ok
        }
    }
}

/// Run one stage and turn whatever happens into a `StageResult`
pub async fn run_stage(
    stage: &dyn Stage,
    ctx: &StageContext,
    router: &ProviderRouter,
) -> StageResult {
    let name = stage.name();
    let started_at = Utc::now();
    info!(stage = %name, run_id = %ctx.workspace.run_id(), "Stage started");

    // Attributions and artifacts recorded before a failure stay in the result
    let mut output = StageOutput::new();
    let outcome = stage.run(ctx, router, &mut output).await;

    let (status, error) = match outcome {
        Ok(()) => (output.status(), None),
        Err(e) => {
            warn!(stage = %name, error = %e, "Stage failed");
            (StageStatus::Failed, Some(e.to_string()))
        }
    };
    let result = StageResult {
        stage: name,
        status,
        artifacts: output.artifacts,
        error,
        providers: output.providers,
        started_at,
        finished_at: Utc::now(),
    };

    info!(
        stage = %name,
        status = ?result.status,
        files = result.files_generated(),
        "Stage finished"
    );
    result
}

/// Display title for a project: the trimmed prompt, at most 64 characters
pub(crate) fn project_title(prompt: &str) -> String {
    let title: String = prompt.trim().chars().take(64).collect();
    if title.is_empty() {
        "Project".to_string()
    } else {
        title
    }
}

/// Pull a single file body out of a response, dropping a markdown fence
///
/// Baseline answers are never usable as file bodies for code stages.
pub(crate) fn usable_body(response: &ProviderResponse) -> Option<String> {
    if response.fallback {
        return None;
    }
    let body = crate::llm::extract_fenced_block(&response.content)
        .unwrap_or(&response.content)
        .trim();
    if body.is_empty() {
        None
    } else {
        Some(format!("{}\n", body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stage_order() {
        let names: Vec<StageName> = default_stages().iter().map(|s| s.name()).collect();
        assert_eq!(names, StageName::ALL.to_vec());
    }

    #[test]
    fn test_usable_body_strips_fence() {
        let response = ProviderResponse::new("groq", "m", "```python\nprint(1)\n```");
        assert_eq!(usable_body(&response).as_deref(), Some("print(1)\n"));
    }

    #[test]
    fn test_usable_body_rejects_baseline() {
        let mut response = ProviderResponse::new("baseline", "templated", "# [baseline] x");
        response.fallback = true;
        assert!(usable_body(&response).is_none());
    }
}
