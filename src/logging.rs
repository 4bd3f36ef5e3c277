use color_eyre::{eyre::eyre, Result};
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Set up logging. `RUST_LOG` controls the level (default "warn").
///
/// With a `log_dir`, logs also go to a daily rolling file. Keep the returned
/// guard alive until exit or buffered lines are lost.
pub fn init_tracing(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

  let (file_layer, guard) = match log_dir {
    Some(dir) => {
      std::fs::create_dir_all(dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;
      let appender = tracing_appender::rolling::daily(dir, "hydra.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      (
        Some(fmt::layer().with_ansi(false).with_writer(writer)),
        Some(guard),
      )
    }
    None => (None, None),
  };

  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(io::stderr))
    .with(file_layer)
    .with(filter)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}
