//! Non-interactive subcommands.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::Subcommand;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::info;

use crate::catalog::{Catalog, display_role, summarize_role};
use crate::devlog::LogBook;
use crate::export::{self, ExportBundle};
use crate::releases::{self, DownloadEvent};
use crate::remote::{CatalogFetcher, GitHubSource, RemoteSource};
use crate::search::{Category, CategoryFilter, SearchOutcome, search};
use crate::store::{CatalogStore, write_file};

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Search modes by name, slug or group
  Search {
    query: Option<String>,
    /// Only list modes in this category
    #[arg(short, long)]
    category: Option<Category>,
  },
  /// Show one mode in full
  Show { slug: String },
  /// Check the repository for a newer catalog
  Refresh {
    /// Download even if the local copy is newer
    #[arg(short, long)]
    force: bool,
    /// Skip the confirmation for --force
    #[arg(short, long)]
    yes: bool,
  },
  /// Write selected modes as a .roomodes file
  Export {
    /// Slug to include (repeatable)
    #[arg(short, long = "slug")]
    slugs: Vec<String>,
    /// Include every mode in the catalog
    #[arg(long, conflicts_with = "slugs")]
    all: bool,
    /// Output path, or '-' for stdout
    #[arg(short, long, default_value = ".roomodes")]
    output: PathBuf,
  },
  /// List release assets of the catalog repository
  Releases,
  /// Download a release asset
  Download {
    asset: String,
    /// Directory to save into
    #[arg(short, long, default_value = ".")]
    output: PathBuf,
  },
  /// Print the developer log
  Logs {
    /// Empty the log instead
    #[arg(long)]
    clear: bool,
  },
  /// Forget the cached catalog and logs
  ClearCache {
    #[arg(short, long)]
    yes: bool,
  },
  /// Write a JSON dump of cached data, theme and logs
  Dump {
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// Print shell completions
  Completions { shell: clap_complete::Shell },
}

pub fn is_yes(answer: &str) -> bool {
  matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Ask a yes/no question. Anything but an explicit yes declines.
pub fn confirm_with(input: &mut impl BufRead, out: &mut impl Write, question: &str) -> Result<bool> {
  write!(out, "{} [y/N] ", question)?;
  out.flush()?;
  let mut line = String::new();
  input.read_line(&mut line).context("Failed to read answer")?;
  Ok(is_yes(&line))
}

fn confirm(question: &str) -> Result<bool> {
  confirm_with(&mut std::io::stdin().lock(), &mut std::io::stderr(), question)
}

/// Active catalog, fetched once when nothing is cached yet.
pub async fn ensure_catalog<S: RemoteSource>(fetcher: &CatalogFetcher<S>, err: &mut impl Write) -> Result<()> {
  if !fetcher.store().current().is_empty() {
    return Ok(());
  }
  writeln!(err, "No cached catalog, fetching…")?;
  let result = fetcher.check_for_update(false).await;
  writeln!(err, "{}", result)?;
  if fetcher.store().current().is_empty() {
    bail!("No catalog available: {}", result);
  }
  Ok(())
}

pub fn search_cmd(catalog: &Catalog, query: &str, category: Option<Category>, out: &mut impl Write) -> Result<()> {
  let outcome = search(catalog, query, CategoryFilter::from(category));
  if outcome == SearchOutcome::NoQuery {
    writeln!(out, "Give a search term or --category to list modes.")?;
    return Ok(());
  }
  let records = outcome.records();
  if records.is_empty() {
    writeln!(out, "No modes match.")?;
  }
  let slug_w = records.iter().map(|r| r.slug.chars().count()).max().unwrap_or(0);
  for record in records {
    writeln!(out, "{:<slug_w$}  {:<10}  {}", record.slug, Category::of(&record.slug).label(), record.name)?;
  }
  Ok(())
}

pub fn show_cmd(catalog: &Catalog, slug: &str, out: &mut impl Write) -> Result<()> {
  let Some(record) = catalog.find(slug) else {
    bail!("No mode with slug '{}'", slug);
  };
  let groups: Vec<&str> = record.groups.iter().map(|g| g.tag()).collect();
  writeln!(out, "{}", record.name)?;
  writeln!(out, "slug:     {}", record.slug)?;
  writeln!(out, "category: {}", Category::of(&record.slug).label())?;
  writeln!(out, "groups:   {}", if groups.is_empty() { "none".to_string() } else { groups.join(", ") })?;
  writeln!(out)?;
  writeln!(out, "{}", summarize_role(&record.role_definition))?;
  writeln!(out)?;
  writeln!(out, "{}", display_role(&record.role_definition))?;
  Ok(())
}

pub async fn refresh_cmd<S: RemoteSource>(
  fetcher: &CatalogFetcher<S>,
  force: bool,
  yes: bool,
  out: &mut impl Write,
) -> Result<()> {
  if force
    && !yes
    && !confirm("Force download the latest catalog? A newer local copy will be overwritten.")?
  {
    writeln!(out, "Cancelled.")?;
    return Ok(());
  }
  let result = fetcher.check_for_update(force).await;
  writeln!(out, "{}", result)?;
  if result.is_failure() {
    bail!("Refresh failed");
  }
  Ok(())
}

pub fn export_cmd(catalog: &Catalog, slugs: &[String], all: bool, output: &Path, out: &mut impl Write) -> Result<()> {
  let slugs: Vec<String> =
    if all { catalog.custom_modes.iter().map(|m| m.slug.clone()).collect() } else { slugs.to_vec() };
  let text = export::compile_selection(catalog, &slugs)?;
  if output == Path::new("-") {
    writeln!(out, "{}", text)?;
  } else {
    write_file(output, &text)?;
    let count = export::select(catalog, &slugs).len();
    info!(success = true, count, path = %output.display(), "export: custom catalog written");
    writeln!(out, "Wrote {} modes to {}", count, output.display())?;
  }
  Ok(())
}

pub async fn releases_cmd(source: &GitHubSource, out: &mut impl Write) -> Result<()> {
  let list = releases::list_releases(source).await?;
  if list.is_empty() {
    writeln!(out, "No releases found for {}.", source.repo_label())?;
  }
  for release in &list {
    writeln!(out, "{} ({})", release.title(), release.tag_name)?;
    for asset in &release.assets {
      writeln!(out, "  {:<40} {:>12}", asset.name, asset.size_label())?;
    }
  }
  Ok(())
}

pub async fn download_cmd(
  source: &GitHubSource,
  asset_name: &str,
  dir: &Path,
  out: &mut impl Write,
) -> Result<PathBuf> {
  let list = releases::list_releases(source).await?;
  let Some(asset) = releases::find_asset(&list, asset_name) else {
    bail!("No release asset named '{}'", asset_name);
  };
  writeln!(out, "Downloading {} ({})", asset.name, asset.size_label())?;
  let dest = dir.join(&asset.name);
  let (tx, mut rx) = mpsc::unbounded_channel();
  let handle = releases::spawn_download(source.client().clone(), asset.browser_download_url.clone(), dest, tx);

  let mut finished = None;
  while let Some(event) = rx.recv().await {
    match event {
      DownloadEvent::Progress(pct) => {
        write!(out, "\r{:>3}%", pct)?;
        out.flush()?;
      }
      DownloadEvent::Finished(path) => {
        writeln!(out, "\rSaved to {}", path.display())?;
        finished = Some(path);
      }
      DownloadEvent::Failed(reason) => {
        writeln!(out)?;
        bail!("Download failed: {}", reason);
      }
    }
  }
  handle.await.context("Download task failed")?;
  finished.context("Download ended without a result")
}

pub fn logs_cmd(logs: &LogBook, clear: bool, out: &mut impl Write) -> Result<()> {
  if clear {
    logs.clear();
    writeln!(out, "Logs cleared.")?;
    return Ok(());
  }
  for entry in logs.entries() {
    writeln!(out, "{} {:<8} {}", entry.timestamp.to_rfc3339(), entry.severity.label(), entry.message)?;
  }
  Ok(())
}

pub fn clear_cache_cmd(store: &CatalogStore, logs: &LogBook, yes: bool, out: &mut impl Write) -> Result<()> {
  if !yes && !confirm("Remove the cached catalog, its timestamp and all logs?")? {
    writeln!(out, "Cancelled.")?;
    return Ok(());
  }
  store.clear()?;
  logs.clear();
  info!("devlog: cache cleared");
  writeln!(out, "Cache cleared.")?;
  Ok(())
}

pub fn dump_cmd(
  store: &CatalogStore,
  theme: Option<String>,
  logs: &LogBook,
  output: Option<PathBuf>,
  out: &mut impl Write,
) -> Result<PathBuf> {
  let now = Utc::now();
  let bundle = ExportBundle::collect(store.kv().as_ref(), theme, logs.entries(), now);
  let path = output.unwrap_or_else(|| PathBuf::from(ExportBundle::file_name(now)));
  write_file(&path, &bundle.to_json()?)?;
  info!(success = true, path = %path.display(), "devlog: data exported");
  writeln!(out, "Exported data to {}", path.display())?;
  Ok(path)
}
