mod app;
mod commands;
mod event;
mod http;
mod ui;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use rehydrate::cache::{CacheLayer, MemoryTier, SyncReport, Synchronizer};
use rehydrate::config::Config;
use rehydrate::lifecycle::LifecycleObserver;
use rehydrate::logging;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "rehydrate")]
#[command(about = "A terminal cache browser that survives restarts")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/rehydrate/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Directory holding the durable tier
  #[arg(long)]
  cache_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Start the terminal UI (default)
  Run,
  /// Print the persisted snapshot without starting the UI
  Inspect,
  /// Remove the persisted snapshot
  Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;

  // Override cache dir if specified on command line
  if let Some(dir) = args.cache_dir {
    config.cache.dir = Some(dir);
  }

  match args.command.unwrap_or(Command::Run) {
    Command::Run => run(config).await,
    Command::Inspect => inspect(config).await,
    Command::Clear => clear(config),
  }
}

async fn run(config: Config) -> Result<()> {
  let dir = config.cache.resolve_dir()?;
  let _guard = logging::init(&config.logging, &dir)?;

  let store = config.cache.open_store()?;
  let memory = Arc::new(MemoryTier::new());
  let sync = Arc::new(Synchronizer::new(memory.clone(), store));
  let lifecycle = LifecycleObserver::new(sync);
  let cache = CacheLayer::new(memory).with_stale_time(config.cache.stale_time());

  tracing::info!(dir = %dir.display(), "starting");

  let mut app = app::App::new(config, cache, lifecycle)?;
  app.run().await
}

async fn inspect(config: Config) -> Result<()> {
  logging::init_stderr(&config.logging);

  let store = config.cache.open_store()?;
  let sync = Synchronizer::new(Arc::new(MemoryTier::new()), store);

  println!("snapshot: {}", sync.store_location());
  match sync.on_resume().await {
    SyncReport::Failed { error, .. } => return Err(eyre!("Failed to read snapshot: {}", error)),
    SyncReport::NoSnapshot => {
      println!("no snapshot");
      return Ok(());
    }
    _ => {}
  }

  for (key, entry) in sync.memory().entries() {
    println!("{:>6}  {}", ui::format_age(entry.age()), key);
  }
  Ok(())
}

fn clear(config: Config) -> Result<()> {
  let store = config.cache.open_store()?;
  store
    .clear()
    .map_err(|e| eyre!("Failed to clear snapshot: {}", e))?;
  println!("cleared {}", store.describe());
  Ok(())
}
