use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global tracing subscriber for a plugin process.
///
/// Logs go to stderr (the host captures plugin output into its own log
/// window) and, when `log_dir` is given, to a daily-rolling `<file_name>` in
/// that directory. `RUST_LOG` wins over `log_level` when set.
///
/// Keep the returned guard alive for as long as the process runs, otherwise
/// buffered file output is lost.
pub fn init_tracing(
    log_level: &str,
    log_dir: Option<&Path>,
    file_name: &str,
) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .with_context(|| format!("invalid log level `{log_level}`"))?;

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("could not create log dir {}", dir.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(daily(dir, file_name));
            let layer = fmt::layer().with_ansi(false).with_target(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(guard)
}
