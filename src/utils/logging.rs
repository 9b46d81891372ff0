use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the logging system.
///
/// Crate-level verbosity is controlled by the flag; everything else stays
/// at `warn` unless `RUST_LOG` overrides it.
pub fn init_logging(verbose: bool, log_file: Option<PathBuf>) -> Result<()> {
    let crate_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::from_default_env()
        .add_directive(format!("scroll_harvester={}", crate_level).parse()?)
        .add_directive("warn".parse()?);

    let stderr_layer = fmt::layer().with_target(true);

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create log directory: {}", parent.display()))?;
            }
            let file = fs::File::create(&path)
                .context(format!("Failed to create log file: {}", path.display()))?;
            let file_layer = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(file);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .init();
        }
    }

    Ok(())
}
