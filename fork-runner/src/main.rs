use anyhow::Result;
use clap::Parser;
use fork_logging::{init_subscriber, LogSettings};
use fork_orchestrator::ForkSettings;
use fork_runner::{render, run, Config};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    // Keep the guard alive so file logs are flushed on exit
    let _log_guard = init_subscriber(&LogSettings::from_env())?;

    let settings = ForkSettings::from_env();
    info!(
        "Forking {} into {} (catalog: {}, analytics: {})",
        config.source_application_id,
        config.target_workspace_id,
        config.catalog.display(),
        settings.analytics_enabled
    );

    let result = run(&config, settings).await?;
    println!("{}", render(&result, config.format)?);

    Ok(())
}
