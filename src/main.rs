mod app;
mod catalog;
mod clipboard;
mod commands;
mod config;
mod constants;
mod devlog;
mod export;
mod input;
mod releases;
mod remote;
mod search;
mod store;
mod theme;
mod ui;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use ratatui::{
  DefaultTerminal,
  crossterm::event::{self, Event, KeyEventKind},
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use app::App;
use commands::Command;
use config::Config;
use constants::constants;
use devlog::{DevLogLayer, LogBook};
use remote::{CatalogFetcher, GitHubSource};
use store::{CatalogStore, FileKv, KvStore, MemoryKv};

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
  /// Keep all state in memory for this run
  #[arg(long, global = true)]
  ephemeral: bool,
  /// Catalog repository as owner/name (default: saved preference, then the built-in repo)
  #[arg(long, global = true)]
  repo: Option<String>,
  #[command(subcommand)]
  command: Option<Command>,
}

// --- Logging ---

fn init_logging(data_dir: &Path, book: LogBook) -> tracing_appender::non_blocking::WorkerGuard {
  use tracing_subscriber::{EnvFilter, fmt, prelude::*};

  let logs_dir = data_dir.join("logs");
  std::fs::create_dir_all(&logs_dir).ok();

  let file_appender = tracing_appender::rolling::daily(&logs_dir, "modefinder.log");
  let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

  let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,modefinder=debug"));

  // The terminal belongs to the TUI, so the fmt layer only writes to the file.
  tracing_subscriber::registry()
    .with(env_filter)
    .with(fmt::layer().with_writer(non_blocking).with_ansi(false).with_target(true))
    .with(DevLogLayer::new(book))
    .init();

  guard
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  if let Some(Command::Completions { shell }) = args.command {
    clap_complete::generate(shell, &mut Args::command(), "modefinder", &mut std::io::stdout());
    return Ok(());
  }

  let data_dir = store::data_dir()?;
  let kv: Arc<dyn KvStore> =
    if args.ephemeral { Arc::new(MemoryKv::default()) } else { Arc::new(FileKv::new(data_dir.join("store"))) };
  let logs = LogBook::load(kv.clone());
  let _log_guard = init_logging(&data_dir, logs.clone());

  info!(version = env!("CARGO_PKG_VERSION"), ephemeral = args.ephemeral, "modefinder starting");

  let config = Config::load();
  let repo = args.repo.clone().or_else(|| config.repo.clone());
  let (owner, name) = match repo {
    Some(ref value) => config::parse_repo(value)?,
    None => (constants().repo_owner.clone(), constants().repo_name.clone()),
  };
  let source = GitHubSource::new(&owner, &name)?;
  info!(repo = %source.repo_label(), "remote: using repository");

  let store = Arc::new(CatalogStore::new(kv));
  store.restore();
  let fetcher = Arc::new(CatalogFetcher::new(source, store.clone()));

  match args.command {
    None => run_tui(fetcher, logs, config).await,
    Some(command) => run_command(command, &fetcher, &logs, &config).await,
  }
}

async fn run_command(
  command: Command,
  fetcher: &CatalogFetcher<GitHubSource>,
  logs: &LogBook,
  config: &Config,
) -> Result<()> {
  let mut out = std::io::stdout();
  let mut err = std::io::stderr();
  let store = fetcher.store();
  match command {
    Command::Search { query, category } => {
      commands::ensure_catalog(fetcher, &mut err).await?;
      commands::search_cmd(&store.current(), query.as_deref().unwrap_or(""), category, &mut out)
    }
    Command::Show { slug } => {
      commands::ensure_catalog(fetcher, &mut err).await?;
      commands::show_cmd(&store.current(), &slug, &mut out)
    }
    Command::Refresh { force, yes } => commands::refresh_cmd(fetcher, force, yes, &mut out).await,
    Command::Export { slugs, all, output } => {
      commands::ensure_catalog(fetcher, &mut err).await?;
      commands::export_cmd(&store.current(), &slugs, all, &output, &mut out)
    }
    Command::Releases => commands::releases_cmd(fetcher.source(), &mut out).await,
    Command::Download { asset, output } => {
      commands::download_cmd(fetcher.source(), &asset, &output, &mut out).await.map(|_| ())
    }
    Command::Logs { clear } => commands::logs_cmd(logs, clear, &mut out),
    Command::ClearCache { yes } => commands::clear_cache_cmd(store, logs, yes, &mut out),
    Command::Dump { output } => {
      commands::dump_cmd(store, config.theme_name.clone(), logs, output, &mut out).map(|_| ())
    }
    Command::Completions { .. } => Ok(()),
  }
}

async fn run_tui(fetcher: Arc<CatalogFetcher<GitHubSource>>, logs: LogBook, config: Config) -> Result<()> {
  let default_hook = std::panic::take_hook();
  std::panic::set_hook(Box::new(move |info| {
    ratatui::restore();
    default_hook(info);
  }));

  let store = fetcher.store().clone();
  let mut app = App::new(store.clone(), app::refresher(fetcher), logs, config, config::prefs_path());
  app.run_search();
  if store.current().is_empty() {
    warn!("ui: no cached catalog, fetching on startup");
    app.trigger_refresh();
  }

  let mut terminal = ratatui::init();
  let result = run(&mut terminal, &mut app).await;
  ratatui::restore();
  info!("modefinder exiting");
  result
}

async fn run(terminal: &mut DefaultTerminal, app: &mut App) -> Result<()> {
  loop {
    app.check_pending();

    terminal.draw(|frame| ui::ui(frame, app)).context("Failed to draw frame")?;

    // Poll without blocking the runtime so spawned refreshes make progress.
    let ready = tokio::task::block_in_place(|| event::poll(Duration::from_millis(100)))?;
    if ready {
      match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
          input::handle_key_event(app, key);
        }
        _ => {}
      }
    }

    if app.should_quit {
      break;
    }
  }
  Ok(())
}
