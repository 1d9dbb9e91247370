//! Process-wide tracing setup for fork services and tools.

use anyhow::{anyhow, Result};
use std::{env, path::Path, path::PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::MakeWriter, layer::Layered, prelude::*, registry, EnvFilter, Layer, Registry,
};

type Base = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<Base> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Console,
    File,
    Both,
}

impl LogOutput {
    fn parse(value: &str) -> Self {
        match value {
            "file" => LogOutput::File,
            "both" => LogOutput::Both,
            _ => LogOutput::Console,
        }
    }

    fn uses_console(self) -> bool {
        matches!(self, LogOutput::Console | LogOutput::Both)
    }

    fn uses_file(self) -> bool {
        matches!(self, LogOutput::File | LogOutput::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    pub output: LogOutput,
    pub format: LogFormat,
    pub file_path: PathBuf,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl LogSettings {
    /// Read `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT` and `LOG_FILE_PATH`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let format = match lookup("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Human,
        };

        Self {
            level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            output: LogOutput::parse(lookup("LOG_OUTPUT").as_deref().unwrap_or("console")),
            format,
            file_path: lookup("LOG_FILE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| env::temp_dir().join("fork.log")),
        }
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level. Keep the returned guard alive for as long as file
/// output should be flushed.
pub fn init_subscriber(settings: &LogSettings) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .map_err(|e| anyhow!("Invalid log level '{}': {}", settings.level, e))?
        .add_directive("tokio=warn".parse()?);

    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = None;

    if settings.output.uses_console() {
        layers.push(fmt_layer(settings.format, std::io::stderr, true));
    }

    if settings.output.uses_file() {
        let log_dir = settings
            .file_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let log_filename = settings
            .file_path
            .file_name()
            .unwrap_or_else(|| "fork.log".as_ref());

        let file_appender = tracing_appender::rolling::daily(log_dir, log_filename);
        let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(worker_guard);
        layers.push(fmt_layer(settings.format, non_blocking, false));
    }

    registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    tracing::debug!(
        level = %settings.level,
        output = ?settings.output,
        format = ?settings.format,
        file = %settings.file_path.display(),
        "Logging initialised"
    );

    Ok(guard)
}

fn fmt_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi);

    match format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Human => layer.boxed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(vars: &[(&str, &str)]) -> LogSettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = settings_from(&[]);
        assert_eq!(settings.level, "info");
        assert_eq!(settings.output, LogOutput::Console);
        assert_eq!(settings.format, LogFormat::Human);
        assert!(settings.file_path.ends_with("fork.log"));
    }

    #[test]
    fn test_explicit_values() {
        let settings = settings_from(&[
            ("LOG_LEVEL", "debug"),
            ("LOG_OUTPUT", "both"),
            ("LOG_FORMAT", "json"),
            ("LOG_FILE_PATH", "/var/log/fork/runner.log"),
        ]);

        assert_eq!(settings.level, "debug");
        assert!(settings.output.uses_console());
        assert!(settings.output.uses_file());
        assert_eq!(settings.format, LogFormat::Json);
        assert_eq!(settings.file_path, PathBuf::from("/var/log/fork/runner.log"));
    }

    #[test]
    fn test_unknown_output_falls_back_to_console() {
        let settings = settings_from(&[("LOG_OUTPUT", "syslog")]);
        assert_eq!(settings.output, LogOutput::Console);
        assert!(!settings.output.uses_file());
    }

    #[test]
    fn test_init_subscriber_installs_once() {
        let settings = settings_from(&[("LOG_LEVEL", "debug")]);

        let guard = init_subscriber(&settings).expect("first install should succeed");
        assert!(guard.is_none());
        tracing::debug!("subscriber installed");

        assert!(init_subscriber(&settings).is_err());
    }
}
