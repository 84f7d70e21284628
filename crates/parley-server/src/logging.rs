//! Structured logging setup

use anyhow::Context;
use parley_config::{expand_tilde, LoggingConfig};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// Filter precedence: explicit override, then `RUST_LOG`, then the config level
pub fn build_filter(level_override: Option<&str>, config: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    if let Some(level) = level_override {
        return EnvFilter::try_new(level).with_context(|| format!("invalid log level '{}'", level));
    }
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(config.level.as_str())
            .with_context(|| format!("invalid log level '{}'", config.level.as_str())),
    }
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for the whole process; dropping it stops
/// the file writer.
pub fn init_logging(
    config: &LoggingConfig,
    level_override: Option<&str>,
) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = build_filter(level_override, config)?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    layers.push(if config.json {
        tracing_subscriber::fmt::layer().json().with_target(true).boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    });

    let mut guard = None;
    if let Some(file) = &config.file {
        let path = expand_tilde(file).with_context(|| format!("cannot resolve log path '{}'", file))?;
        let (dir, name) = split_log_path(&path)?;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log directory {:?}", dir))?;

        let (writer, worker_guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .boxed(),
        );
        guard = Some(worker_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("failed to set tracing subscriber")?;

    Ok(guard)
}

fn split_log_path(path: &Path) -> anyhow::Result<(&Path, &std::ffi::OsStr)> {
    let name = path
        .file_name()
        .with_context(|| format!("log path {:?} has no file name", path))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok((dir, name))
}
