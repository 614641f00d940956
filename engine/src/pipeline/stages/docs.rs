use async_trait::async_trait;
use sdk::StageName;

use super::{project_title, Stage, StageOutput};
use crate::llm::router::ProviderRouter;
use crate::llm::ProviderRequest;
use crate::pipeline::templates::{docs_index, MKDOCS};
use crate::pipeline::{StageContext, StageError};

pub const README_PATH: &str = "README.md";

/// Runs even after an earlier stage failed, so the run always has a README
pub struct DocsStage;

#[async_trait]
impl Stage for DocsStage {
    fn name(&self) -> StageName {
        StageName::Docs
    }

    async fn run(
        &self,
        ctx: &StageContext,
        router: &ProviderRouter,
        output: &mut StageOutput,
    ) -> Result<(), StageError> {
        let request = ProviderRequest::text(format!(
            "Generate a concise README in markdown for the project: {}. \
             Include setup, run, test, and deploy steps. Files in the project:\n{}",
            ctx.prompt,
            ctx.artifact_index()
        ))
        .with_file_target(README_PATH)
        .prefer("gemini");

        let response = output.generate(router, ctx, "readme", request).await;
        output.write(ctx, README_PATH, &response.content)?;
        output.write(ctx, "mkdocs.yml", MKDOCS)?;
        output.write(ctx, "docs/index.md", &docs_index(&project_title(&ctx.prompt)))?;

        Ok(())
    }
}
