//! Full-release downloads: list release assets and stream one to disk.

use anyhow::{Context, Result, anyhow};
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::constants::constants;
use crate::remote::GitHubSource;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Asset {
  pub name: String,
  pub browser_download_url: String,
  #[serde(default)]
  pub size: u64,
}

impl Asset {
  /// Size in megabytes, two decimals.
  pub fn size_label(&self) -> String {
    format!("{:.2} MB", self.size as f64 / (1024.0 * 1024.0))
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Release {
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub tag_name: String,
  #[serde(default)]
  pub assets: Vec<Asset>,
}

impl Release {
  pub fn title(&self) -> &str {
    self.name.as_deref().filter(|n| !n.is_empty()).unwrap_or(&self.tag_name)
  }
}

/// Progress of a running download.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
  /// Percent complete. Only sent when the server reports a content length.
  Progress(u8),
  Finished(PathBuf),
  Failed(String),
}

pub async fn list_releases(source: &GitHubSource) -> Result<Vec<Release>> {
  let url = source.repo_url("releases");
  info!(url = %url, "releases: fetching release list");
  let response = source.client().get(&url).send().await.with_context(|| format!("Failed to fetch {}", url))?;
  let response = response.error_for_status().context("Release listing returned an error status")?;
  let releases = response.json::<Vec<Release>>().await.context("Failed to decode release listing")?;
  info!(success = true, count = releases.len(), "releases: fetched release list");
  Ok(releases)
}

/// Find an asset by exact name.
pub fn find_asset<'a>(releases: &'a [Release], name: &str) -> Option<&'a Asset> {
  releases.iter().flat_map(|r| r.assets.iter()).find(|a| a.name == name)
}

fn percent(done: u64, total: u64) -> u8 {
  if total == 0 { 0 } else { ((done.min(total) * 100) / total) as u8 }
}

/// Stream `url` into `dest`, reporting progress on `tx`.
pub async fn download_asset(
  client: &Client,
  url: &str,
  dest: &Path,
  tx: &mpsc::UnboundedSender<DownloadEvent>,
) -> Result<PathBuf> {
  info!(url = %url, dest = %dest.display(), "releases: download started");
  let response = client.get(url).send().await.with_context(|| format!("Failed to download {}", url))?;
  let response = response.error_for_status().context("Download returned an error status")?;

  let total = response.content_length().unwrap_or(0);
  let mut downloaded: u64 = 0;

  if let Some(parent) = dest.parent()
    && !parent.as_os_str().is_empty()
  {
    tokio::fs::create_dir_all(parent).await.context("Failed to create download directory")?;
  }

  // Write to a temp file, then rename
  let tmp_path = dest.with_extension("part");
  let mut file = tokio::fs::File::create(&tmp_path).await.context("Failed to create download file")?;

  let mut stream = response.bytes_stream();
  // Throttle progress events
  let interval = Duration::from_millis(constants().progress_interval_ms);
  let mut last_progress = Instant::now();

  while let Some(chunk) = stream.next().await {
    let chunk = chunk.context("Error downloading chunk")?;
    file.write_all(&chunk).await.context("Error writing download file")?;
    downloaded += chunk.len() as u64;
    if total > 0 && (last_progress.elapsed() >= interval || downloaded >= total) {
      let _ = tx.send(DownloadEvent::Progress(percent(downloaded, total)));
      last_progress = Instant::now();
    }
  }

  file.flush().await.context("Error flushing download file")?;
  drop(file);

  if total > 0 && downloaded < total {
    return Err(anyhow!("Download ended early ({} of {} bytes)", downloaded, total));
  }

  tokio::fs::rename(&tmp_path, dest).await.context("Failed to finalize download")?;
  info!(success = true, bytes = downloaded, path = %dest.display(), "releases: download complete");
  Ok(dest.to_path_buf())
}

/// Run `download_asset` in the background. The final event is `Finished` or `Failed`.
pub fn spawn_download(
  client: Client,
  url: String,
  dest: PathBuf,
  tx: mpsc::UnboundedSender<DownloadEvent>,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    match download_asset(&client, &url, &dest, &tx).await {
      Ok(path) => {
        let _ = tx.send(DownloadEvent::Progress(100));
        let _ = tx.send(DownloadEvent::Finished(path));
      }
      Err(e) => {
        let reason = format!("{:#}", e);
        error!(err = %reason, "releases: download failed");
        let _ = tokio::fs::remove_file(dest.with_extension("part")).await;
        let _ = tx.send(DownloadEvent::Failed(reason));
      }
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::remote::test_http;

  fn asset(name: &str, size: u64) -> Asset {
    Asset { name: name.to_string(), browser_download_url: format!("https://example.test/{}", name), size }
  }

  #[test]
  fn size_label_in_megabytes() {
    assert_eq!(asset("a.zip", 1024 * 1024 * 3 / 2).size_label(), "1.50 MB");
    assert_eq!(asset("a.zip", 0).size_label(), "0.00 MB");
  }

  #[test]
  fn release_listing_decodes_and_finds_assets() {
    let json = r#"[
      {"name": "v2", "tag_name": "v2.0.0", "assets": [{"name": "full.zip", "browser_download_url": "u1", "size": 10}]},
      {"name": "", "tag_name": "v1.0.0", "assets": []},
      {"tag_name": "v0.9.0", "assets": [{"name": "old.zip", "browser_download_url": "u2", "size": 5}]}
    ]"#;
    let releases: Vec<Release> = serde_json::from_str(json).unwrap();
    assert_eq!(releases[1].title(), "v1.0.0");
    assert_eq!(releases[0].title(), "v2");
    assert_eq!(find_asset(&releases, "old.zip").map(|a| a.size), Some(5));
    assert!(find_asset(&releases, "nope.zip").is_none());
  }

  #[test]
  fn percent_is_clamped() {
    assert_eq!(percent(50, 200), 25);
    assert_eq!(percent(300, 200), 100);
    assert_eq!(percent(1, 0), 0);
  }

  #[tokio::test]
  async fn download_writes_file_and_reports_completion() {
    let body = vec![7u8; 64 * 1024];
    let url = test_http::serve("200 OK", body.clone(), 1).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("assets/full.zip");
    let (tx, mut rx) = mpsc::unbounded_channel();
    spawn_download(test_http::client(), url, dest.clone(), tx).await.unwrap();

    let mut events = Vec::new();
    while let Some(ev) = rx.recv().await {
      events.push(ev);
    }
    assert_eq!(events.last(), Some(&DownloadEvent::Finished(dest.clone())));
    assert!(events.contains(&DownloadEvent::Progress(100)));
    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert!(!dest.with_extension("part").exists());
  }

  #[tokio::test]
  async fn download_error_status_reports_failure() {
    let url = test_http::serve("404 Not Found", b"missing".to_vec(), 1).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("full.zip");
    let (tx, mut rx) = mpsc::unbounded_channel();
    spawn_download(test_http::client(), url, dest.clone(), tx).await.unwrap();
    assert!(matches!(rx.recv().await, Some(DownloadEvent::Failed(_))));
    assert!(!dest.exists());
  }

  #[tokio::test]
  async fn list_releases_over_http() {
    let json = r#"[{"name":"v1","tag_name":"v1","assets":[{"name":"a.zip","browser_download_url":"u","size":1}]}]"#;
    let base = test_http::serve("200 OK", json.as_bytes().to_vec(), 1).await;
    let source = GitHubSource::with_client(test_http::client(), &base, "o", "r");
    let releases = list_releases(&source).await.unwrap();
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0].assets[0].name, "a.zip");
  }
}
