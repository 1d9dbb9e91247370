pub mod config;

pub use config::{Config, OutputFormat};

use anyhow::{Context, Result};
use fork_orchestrator::{
    Collaborators, ForkOrchestrator, ForkSettings, InMemoryCatalog, TracingAnalytics,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Build an orchestrator whose collaborators are all backed by `catalog`
pub fn orchestrator_for(catalog: &InMemoryCatalog, settings: ForkSettings) -> ForkOrchestrator {
    let catalog = Arc::new(catalog.clone());
    let collaborators = Collaborators {
        applications: catalog.clone(),
        workspaces: catalog.clone(),
        session: catalog.clone(),
        executor: catalog.clone(),
        analytics: Arc::new(TracingAnalytics),
        projector: catalog,
    };

    ForkOrchestrator::new(collaborators, settings)
}

/// Run the fork described by `config` and return its result as JSON
pub async fn run(config: &Config, settings: ForkSettings) -> Result<Value> {
    let raw = tokio::fs::read_to_string(&config.catalog)
        .await
        .with_context(|| format!("Failed to read catalog {}", config.catalog.display()))?;
    let catalog = InMemoryCatalog::from_json(&raw)?;
    let orchestrator = orchestrator_for(&catalog, settings);

    let result = match &config.environment {
        Some(environment) => {
            info!("Forking with explicit environment {}", environment);
            let forked = orchestrator
                .fork_to_workspace_with_environment(
                    &config.source_application_id,
                    &config.target_workspace_id,
                    environment,
                )
                .await?;
            serde_json::to_value(forked)?
        }
        None => {
            let imported = orchestrator
                .fork_to_workspace(
                    &config.source_application_id,
                    &config.target_workspace_id,
                    config.branch.as_deref(),
                )
                .await?;
            serde_json::to_value(imported)?
        }
    };

    if let Some(path) = &config.output_catalog {
        let snapshot = serde_json::to_string_pretty(&catalog.snapshot().await)?;
        tokio::fs::write(path, snapshot)
            .await
            .with_context(|| format!("Failed to write catalog {}", path.display()))?;
        info!("Catalog written to {}", path.display());
    }

    Ok(result)
}

pub fn render(value: &Value, format: OutputFormat) -> Result<String> {
    let rendered = match format {
        OutputFormat::Pretty => serde_json::to_string_pretty(value)?,
        OutputFormat::Compact => serde_json::to_string(value)?,
    };
    Ok(rendered)
}
