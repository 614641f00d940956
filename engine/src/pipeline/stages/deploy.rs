use async_trait::async_trait;
use sdk::StageName;

use super::{Stage, StageOutput};
use crate::llm::router::ProviderRouter;
use crate::llm::{parse_file_map, ProviderRequest};
use crate::pipeline::templates::{DEPLOY_WORKFLOW, DOCKERFILE, DOCKER_COMPOSE};
use crate::pipeline::{StageContext, StageError};

/// Deployment files and their fallbacks, in write order
const DEPLOY_FILES: [(&str, &str); 3] = [
    ("Dockerfile", DOCKERFILE),
    ("docker-compose.yml", DOCKER_COMPOSE),
    (".github/workflows/deploy.yml", DEPLOY_WORKFLOW),
];

pub struct DeployStage;

#[async_trait]
impl Stage for DeployStage {
    fn name(&self) -> StageName {
        StageName::Deploy
    }

    async fn run(
        &self,
        ctx: &StageContext,
        router: &ProviderRouter,
        output: &mut StageOutput,
    ) -> Result<(), StageError> {
        let request = ProviderRequest::code(format!(
            "Write deployment files for the project '{}': a Dockerfile serving \
             backend.main:app with uvicorn on port 8000, a docker-compose.yml with `api` and \
             `web` (frontend/, port 5173) services, and a GitHub Actions workflow that installs \
             backend/requirements.txt and runs pytest. Return ONLY a JSON object with the keys \
             \"Dockerfile\", \"docker-compose.yml\" and \".github/workflows/deploy.yml\".",
            ctx.prompt
        ))
        .with_language("yaml")
        .with_file_target("Dockerfile");

        let response = output.generate(router, ctx, "deploy", request).await;
        let generated = if response.fallback {
            None
        } else {
            parse_file_map(&response.content)
        };

        for (path, template) in DEPLOY_FILES {
            match generated
                .as_ref()
                .and_then(|files| files.get(path))
                .filter(|body| !body.trim().is_empty())
            {
                Some(body) => output.write(ctx, path, body)?,
                None => output.write_fallback(ctx, path, template)?,
            }
        }

        Ok(())
    }
}
