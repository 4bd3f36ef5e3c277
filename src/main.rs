use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use tokio::runtime::Handle;
use tracing::info;

use hydra::app::App;
use hydra::commands::{self, Command};
use hydra::config::Config;
use hydra::logging;

#[derive(Parser, Debug)]
#[command(name = "hydra")]
#[command(about = "Resto menus, Schamper news and associations, cached for offline use")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./hydra.yaml or $XDG_CONFIG_HOME/hydra/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init_tracing(config.log_dir.as_deref())?;
  info!(base_url = %config.api.base_url, "hydra starting");

  let app = App::new(&config, Handle::current())?;
  let mut stdout = std::io::stdout().lock();
  commands::run(&app, args.command, &mut stdout).await?;

  Ok(())
}
