use async_trait::async_trait;
use sdk::StageName;

use super::{usable_body, Stage, StageOutput};
use crate::llm::router::ProviderRouter;
use crate::llm::ProviderRequest;
use crate::pipeline::diagnostics::run_diagnostics;
use crate::pipeline::templates::{PYTEST_INI, SMOKE_TEST};
use crate::pipeline::{StageContext, StageError};

pub const SMOKE_TEST_PATH: &str = "tests/test_smoke.py";
pub const PYTEST_INI_PATH: &str = "pytest.ini";
pub const DIAGNOSTICS_PATH: &str = "diagnostics.json";

pub struct TestStage;

#[async_trait]
impl Stage for TestStage {
    fn name(&self) -> StageName {
        StageName::Test
    }

    async fn run(
        &self,
        ctx: &StageContext,
        router: &ProviderRouter,
        output: &mut StageOutput,
    ) -> Result<(), StageError> {
        let request = ProviderRequest::code(format!(
            "Write pytest smoke tests for the generated project '{}'. \
             The tests run from the project root. Files present:\n{}\n\n\
             Return only the Python source of {}.",
            ctx.prompt,
            ctx.artifact_index(),
            SMOKE_TEST_PATH
        ))
        .with_language("python")
        .with_file_target(SMOKE_TEST_PATH);

        let response = output.generate(router, ctx, "tests", request).await;
        match usable_body(&response) {
            Some(body) => output.write(ctx, SMOKE_TEST_PATH, &body)?,
            None => output.write_fallback(ctx, SMOKE_TEST_PATH, SMOKE_TEST)?,
        }
        output.write(ctx, PYTEST_INI_PATH, PYTEST_INI)?;

        if ctx.diagnostics.enabled {
            let report = run_diagnostics(ctx.workspace.root(), ctx.diagnostics.timeout).await;
            if !report.passed() {
                output.degraded = true;
            }
            let json = serde_json::to_string_pretty(&report).map_err(std::io::Error::from)?;
            output.write(ctx, DIAGNOSTICS_PATH, &json)?;
        }

        Ok(())
    }
}
