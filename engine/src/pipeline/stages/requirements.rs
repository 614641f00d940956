use async_trait::async_trait;
use sdk::StageName;
use serde::{Deserialize, Serialize};

use super::{Stage, StageOutput};
use crate::llm::router::ProviderRouter;
use crate::llm::ProviderRequest;
use crate::pipeline::{StageContext, StageError};

pub const REQUIREMENTS_MD: &str = "requirements/requirements.md";
pub const REQUIREMENTS_JSON: &str = "requirements/requirements.json";

/// Machine-readable companion to `requirements.md`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequirementsSummary {
    pub title: String,
    pub description: String,
    pub modules: Vec<String>,
    pub frontend: Vec<String>,
    pub backend: Vec<String>,
    pub features: Vec<String>,
    pub deployment: String,
    /// Provider that wrote `requirements.md`
    pub source_provider: String,
}

impl RequirementsSummary {
    pub fn new(prompt: &str, source_provider: &str) -> Self {
        Self {
            title: super::project_title(prompt),
            description: prompt.trim().to_string(),
            modules: vec!["Auth".into(), "Core".into()],
            frontend: vec!["React".into(), "TailwindCSS".into()],
            backend: vec!["FastAPI".into(), "SQLite".into()],
            features: vec!["CRUD".into(), "Search".into(), "User roles".into()],
            deployment: "Docker + GitHub Actions".to_string(),
            source_provider: source_provider.to_string(),
        }
    }
}

pub struct RequirementsStage;

#[async_trait]
impl Stage for RequirementsStage {
    fn name(&self) -> StageName {
        StageName::Requirements
    }

    async fn run(
        &self,
        ctx: &StageContext,
        router: &ProviderRouter,
        output: &mut StageOutput,
    ) -> Result<(), StageError> {
        let request = ProviderRequest::text(format!(
            "Extract detailed, structured requirements (title, description, modules, \
             frontend stack, backend stack, DB schema, API routes, features, deployment) \
             for the following project. Answer in markdown.\n\nProject: {}",
            ctx.prompt
        ))
        .with_file_target(REQUIREMENTS_MD)
        .prefer("gemini");

        let response = output
            .generate(router, ctx, "requirements", request)
            .await;
        output.write(ctx, REQUIREMENTS_MD, &response.content)?;

        let summary = RequirementsSummary::new(&ctx.prompt, &response.provider);
        let json = serde_json::to_string_pretty(&summary).map_err(std::io::Error::from)?;
        output.write(ctx, REQUIREMENTS_JSON, &json)?;

        Ok(())
    }
}
