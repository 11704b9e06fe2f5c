//! Logging setup for the command line runner
//!
//! Two outputs: the console and a per-run file under the dated output
//! directory (`Logs/log_HH_MM_SS.txt`). The file always gets debug detail;
//! the console shows info unless `RUST_LOG` or `--verbose` say otherwise.

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::fmt::{self, time::FormatTime};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::export::OutputLayout;

const CONSOLE_LEVEL: &str = "info";
const FILE_LEVEL: &str = "debug";

/// Markup parser internals are noisy at debug
const QUIET_TARGETS: &str = "html5ever=warn,selectors=warn,reqwest=info,hyper=warn";

/// Wall-clock time in the machine's zone
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer when dropped, so the caller
/// must hold it until the run is over.
pub fn init_logging(layout: &OutputLayout, verbose: bool) -> Result<WorkerGuard> {
    layout
        .create()
        .with_context(|| format!("failed to create output directory {}", layout.root().display()))?;

    let console_level = if verbose { FILE_LEVEL } else { CONSOLE_LEVEL };
    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("{console_level},{QUIET_TARGETS}")))
        .map_err(|e| anyhow!("invalid log filter: {e}"))?;
    let file_filter = EnvFilter::try_new(format!("{FILE_LEVEL},{QUIET_TARGETS}"))
        .map_err(|e| anyhow!("invalid log filter: {e}"))?;

    let file_appender = rolling::never(layout.log_dir(), layout.log_file_name());
    let (file_writer, guard) = non_blocking(file_appender);

    let file_layer = fmt::Layer::new()
        .with_writer(file_writer)
        .with_timer(LocalTimer)
        .with_target(false)
        .with_ansi(false)
        .with_filter(file_filter);

    let console_layer = fmt::Layer::new()
        .with_writer(std::io::stdout)
        .with_timer(LocalTimer)
        .with_target(false)
        .with_filter(console_filter);

    Registry::default()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {e}"))?;

    info!(
        "Logging started, run began at {}",
        layout.started_at().format("%Y-%m-%d %H:%M:%S")
    );
    info!(log = %layout.log_dir().join(layout.log_file_name()).display(), "logging to file");

    Ok(guard)
}
