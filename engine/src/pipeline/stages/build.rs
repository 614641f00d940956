//! Build stage
//!
//! Generates the backend and frontend as JSON file maps and writes them under
//! `backend/` and `frontend/`. Whatever the providers return, the stage ends
//! with the guaranteed scaffold files present; a missing one afterwards is the
//! only way it fails besides disk errors.

use async_trait::async_trait;
use sdk::StageName;
use tracing::warn;

use super::{Stage, StageOutput};
use crate::llm::router::ProviderRouter;
use crate::llm::{parse_file_map, ProviderRequest, ProviderResponse};
use crate::pipeline::templates::{self, BACKEND_REQUIRED, FRONTEND_REQUIRED};
use crate::pipeline::workspace::is_safe_relative;
use crate::pipeline::{StageContext, StageError};

const BACKEND_INSTRUCTION: &str = "Create a FastAPI backend with a modular structure \
    (main.py, routes/, models/, services/) exposing GET /health and CRUD routes for the key \
    entities of the project. Provide pytest tests under tests/. \
    Return ONLY a JSON object mapping file paths relative to backend/ to file contents.";

const FRONTEND_INSTRUCTION: &str = "Build a production-ready React + Tailwind frontend \
    using Vite (package.json, index.html, src/main.jsx, src/App.jsx, components and pages). \
    Return ONLY a JSON object mapping file paths relative to frontend/ to file contents.";

pub struct BuildStage;

#[async_trait]
impl Stage for BuildStage {
    fn name(&self) -> StageName {
        StageName::Build
    }

    async fn run(
        &self,
        ctx: &StageContext,
        router: &ProviderRouter,
        output: &mut StageOutput,
    ) -> Result<(), StageError> {
        self.build_backend(ctx, router, output).await?;
        self.build_frontend(ctx, router, output).await?;

        for required in BACKEND_REQUIRED.iter().chain(FRONTEND_REQUIRED.iter()) {
            if !ctx.workspace.exists(required) {
                return Err(StageError::UnrecoverableContent(format!(
                    "scaffold file missing after build: {}",
                    required
                )));
            }
        }

        Ok(())
    }
}

impl BuildStage {
    async fn build_backend(
        &self,
        ctx: &StageContext,
        router: &ProviderRouter,
        output: &mut StageOutput,
    ) -> Result<(), StageError> {
        let request = ProviderRequest::code(format!(
            "{}\n\nProject: {}\n\nRequirements and design so far:\n{}",
            BACKEND_INSTRUCTION,
            ctx.prompt,
            ctx.artifact_index()
        ))
        .with_language("python")
        .with_file_target("backend/");

        let response = output.generate(router, ctx, "backend", request).await;
        write_file_map(ctx, output, "backend", &response)?;

        // Any scaffold file filling a gap is template content
        for (path, contents) in templates::backend_scaffold() {
            if !ctx.workspace.exists(path) {
                output.write_fallback(ctx, path, &contents)?;
            }
        }

        Ok(())
    }

    async fn build_frontend(
        &self,
        ctx: &StageContext,
        router: &ProviderRouter,
        output: &mut StageOutput,
    ) -> Result<(), StageError> {
        let request = ProviderRequest::code(format!(
            "{}\n\nProject: {}",
            FRONTEND_INSTRUCTION, ctx.prompt
        ))
        .with_language("jsx")
        .with_file_target("frontend/")
        .prefer("v0");

        let response = output.generate(router, ctx, "frontend", request).await;
        let generated = write_file_map(ctx, output, "frontend", &response)?;

        let scaffold = templates::frontend_scaffold(&super::project_title(&ctx.prompt));
        if generated == 0 {
            for (path, contents) in &scaffold {
                output.write_fallback(ctx, path, contents)?;
            }
        } else {
            for path in FRONTEND_REQUIRED {
                if ctx.workspace.exists(path) {
                    continue;
                }
                if let Some(contents) = scaffold.get(path) {
                    output.write_fallback(ctx, path, contents)?;
                }
            }
        }

        Ok(())
    }
}

/// Write a generated `{path: contents}` map under `prefix/`
///
/// Returns how many files were written. Baseline answers, non-map content
/// and unsafe paths write nothing; unsafe entries degrade the stage.
fn write_file_map(
    ctx: &StageContext,
    output: &mut StageOutput,
    prefix: &str,
    response: &ProviderResponse,
) -> Result<usize, StageError> {
    if response.fallback {
        return Ok(0);
    }

    let Some(files) = parse_file_map(&response.content) else {
        warn!(
            provider = %response.provider,
            target = prefix,
            "Generated content is not a file map, using scaffold"
        );
        return Ok(0);
    };

    let mut written = 0;
    for (relative, contents) in files {
        let relative = relative.trim_start_matches("./");
        let relative = relative
            .strip_prefix(&format!("{}/", prefix))
            .unwrap_or(relative);

        if !is_safe_relative(relative) || relative.starts_with('/') {
            warn!(path = %relative, "Skipping generated file outside the run directory");
            output.degraded = true;
            continue;
        }

        output.write(ctx, &format!("{}/{}", prefix, relative), &contents)?;
        written += 1;
    }

    Ok(written)
}
