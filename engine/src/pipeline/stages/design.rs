use async_trait::async_trait;
use sdk::StageName;

use super::requirements::REQUIREMENTS_MD;
use super::{Stage, StageOutput};
use crate::llm::router::ProviderRouter;
use crate::llm::ProviderRequest;
use crate::pipeline::{StageContext, StageError};

pub const DESIGN_MD: &str = "design/design.md";

/// Requirements text carried into the design prompt, at most this many bytes
const REQUIREMENTS_EXCERPT: usize = 6000;

pub struct DesignStage;

#[async_trait]
impl Stage for DesignStage {
    fn name(&self) -> StageName {
        StageName::Design
    }

    async fn run(
        &self,
        ctx: &StageContext,
        router: &ProviderRouter,
        output: &mut StageOutput,
    ) -> Result<(), StageError> {
        // Earlier stage may have failed; design still runs from the prompt alone
        let requirements = ctx
            .workspace
            .resolve(REQUIREMENTS_MD)
            .ok()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .map(|text| excerpt(&text, REQUIREMENTS_EXCERPT).to_string())
            .unwrap_or_default();

        let request = ProviderRequest::text(format!(
            "Produce a software design document in markdown for: {}\n\
             Include an architecture diagram (mermaid), components, data model and API routes.\n\n\
             Requirements:\n{}",
            ctx.prompt, requirements
        ))
        .with_file_target(DESIGN_MD);

        let response = output.generate(router, ctx, "design", request).await;
        output.write(ctx, DESIGN_MD, &response.content)?;

        Ok(())
    }
}

fn excerpt(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
