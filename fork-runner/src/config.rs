use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Replay one application fork against a catalog snapshot.
#[derive(Debug, Clone, Parser)]
#[command(name = "fork-runner", version, about)]
pub struct Config {
    /// JSON catalog of applications, workspaces and the session user
    #[arg(long, env = "FORK_RUNNER_CATALOG")]
    pub catalog: PathBuf,

    /// Application to fork
    #[arg(long = "source")]
    pub source_application_id: String,

    /// Workspace to fork into
    #[arg(long = "target")]
    pub target_workspace_id: String,

    /// Branch to fork from; defaults to the application's default branch
    #[arg(long, conflicts_with = "environment")]
    pub branch: Option<String>,

    /// Copy datasource bindings from this environment instead of the source
    /// workspace's default, skipping branch resolution
    #[arg(long)]
    pub environment: Option<String>,

    /// Write the catalog, including the fork, to this path afterwards
    #[arg(long, env = "FORK_RUNNER_OUTPUT_CATALOG")]
    pub output_catalog: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Compact,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_branch_fork() {
        let config = Config::try_parse_from([
            "fork-runner",
            "--catalog",
            "catalog.json",
            "--source",
            "app-1",
            "--target",
            "ws-2",
            "--branch",
            "develop",
        ])
        .unwrap();

        assert_eq!(config.source_application_id, "app-1");
        assert_eq!(config.target_workspace_id, "ws-2");
        assert_eq!(config.branch.as_deref(), Some("develop"));
        assert_eq!(config.environment, None);
        assert_eq!(config.format, OutputFormat::Pretty);
    }

    #[test]
    fn test_branch_and_environment_conflict() {
        let result = Config::try_parse_from([
            "fork-runner",
            "--catalog",
            "catalog.json",
            "--source",
            "app-1",
            "--target",
            "ws-2",
            "--branch",
            "develop",
            "--environment",
            "env-1",
        ]);

        assert!(result.is_err());
    }
}
