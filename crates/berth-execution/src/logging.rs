//! Process-wide tracing setup.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use berth_core::error::{BerthError, Result};

const DEFAULT_DIRECTIVE: &str = "info";
const LOG_FILE_PREFIX: &str = "berth.log";

/// Installs the global subscriber: an `EnvFilter` (`RUST_LOG`, default
/// `info`), a stderr layer and, when `log_dir` is given, a daily rolling file
/// layer.
///
/// The returned guard must be kept alive for buffered file output to be
/// written out.
pub fn init_logging(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let Some(dir) = log_dir else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .try_init()
            .map_err(|e| BerthError::internal(format!("failed to install logger: {e}")))?;
        return Ok(None);
    };

    std::fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file_layer = fmt::layer().with_writer(writer).with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| BerthError::internal(format!("failed to install logger: {e}")))?;

    tracing::debug!(log_dir = %dir.display(), "[Logging] File logging enabled");
    Ok(Some(guard))
}
