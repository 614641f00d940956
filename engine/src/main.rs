// Forge project builder
// Main entry point for the forge binary

use clap::Parser;
use forge_engine::cli::{Cli, Command};
use forge_engine::config::Config;
use forge_engine::handlers::{
    handle_build, handle_dispatch, handle_history, handle_providers, handle_report, OutputFormat,
};
use forge_engine::jobs::JobOptions;
use forge_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the config file; RUST_LOG wins over both
    let level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(level);

    tracing::info!(
        "Forge v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    match cli.command {
        Command::Build {
            prompt,
            free_only,
            providers,
            detach_poll,
        } => {
            let options = JobOptions {
                free_only,
                providers_filter: (!providers.is_empty()).then_some(providers),
            };
            handle_build(prompt, options, detach_poll, &config, format).await
        }

        Command::Dispatch { prompt, free_only } => {
            handle_dispatch(prompt, free_only, &config, format).await
        }

        Command::Providers => handle_providers(&config, format).await,

        Command::Report { run_dir } => handle_report(run_dir, format).await,

        Command::History { limit } => {
            tracing::info!("Showing last {} jobs", limit);
            handle_history(limit, &config, format).await
        }
    }
}
