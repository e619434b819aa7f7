//! Remote catalog refresh.
//!
//! Lists the repository contents, picks the newest `.roomodes` file by name,
//! and only downloads it when it is newer than the local copy (or when forced).

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, warn};

use crate::catalog::parse;
use crate::constants::constants;
use crate::store::CatalogStore;

/// One entry of the remote directory listing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteFile {
  pub name: String,
  #[serde(default)]
  pub download_url: Option<String>,
  #[serde(default, deserialize_with = "lenient_time")]
  pub updated_at: Option<DateTime<Utc>>,
  #[serde(default, deserialize_with = "lenient_time")]
  pub created_at: Option<DateTime<Utc>>,
}

/// Unparseable or non-string timestamps read as absent.
fn lenient_time<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
  let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
  Ok(
    raw
      .as_ref()
      .and_then(|v| v.as_str())
      .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
      .map(|t| t.with_timezone(&Utc)),
  )
}

impl RemoteFile {
  /// Best available modification time.
  pub fn modified(&self) -> Option<DateTime<Utc>> {
    self.updated_at.or(self.created_at)
  }
}

/// Where catalog files come from.
pub trait RemoteSource: Send + Sync {
  fn list_files(&self) -> impl Future<Output = Result<Vec<RemoteFile>>> + Send;
  fn fetch_text(&self, url: &str) -> impl Future<Output = Result<String>> + Send;
}

/// GitHub REST API for a single repository.
#[derive(Clone)]
pub struct GitHubSource {
  client: Client,
  api_base: String,
  owner: String,
  repo: String,
}

impl GitHubSource {
  pub fn new(owner: &str, repo: &str) -> Result<Self> {
    let client = Client::builder()
      .user_agent(constants().user_agent.as_str())
      .timeout(Duration::from_secs(constants().http_timeout_secs))
      .build()
      .context("Failed to build HTTP client")?;
    Ok(Self::with_client(client, &constants().api_base, owner, repo))
  }

  pub fn with_client(client: Client, api_base: &str, owner: &str, repo: &str) -> Self {
    Self {
      client,
      api_base: api_base.trim_end_matches('/').to_string(),
      owner: owner.to_string(),
      repo: repo.to_string(),
    }
  }

  pub fn client(&self) -> &Client {
    &self.client
  }

  /// `{api}/repos/{owner}/{repo}/{path}`
  pub fn repo_url(&self, path: &str) -> String {
    format!("{}/repos/{}/{}/{}", self.api_base, self.owner, self.repo, path)
  }

  pub fn repo_label(&self) -> String {
    format!("{}/{}", self.owner, self.repo)
  }
}

impl RemoteSource for GitHubSource {
  async fn list_files(&self) -> Result<Vec<RemoteFile>> {
    let url = self.repo_url("contents");
    let response = self.client.get(&url).send().await.with_context(|| format!("Failed to list {}", url))?;
    let response = response.error_for_status().context("Repository listing returned an error status")?;
    response.json::<Vec<RemoteFile>>().await.context("Failed to decode repository listing")
  }

  async fn fetch_text(&self, url: &str) -> Result<String> {
    let response = self.client.get(url).send().await.with_context(|| format!("Failed to fetch {}", url))?;
    let response = response.error_for_status().context("File download returned an error status")?;
    response.text().await.context("Failed to read file content")
  }
}

/// Outcome of a refresh.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateResult {
  /// `stale` is set when a forced refresh replaced local data that was at least as new.
  Updated { count: usize, source_name: String, stale: bool },
  NotNewer,
  NotFound,
  FetchFailed(String),
  ParseFailed(String),
  SaveFailed,
}

impl UpdateResult {
  pub fn is_updated(&self) -> bool {
    matches!(self, UpdateResult::Updated { .. })
  }

  pub fn is_failure(&self) -> bool {
    !matches!(self, UpdateResult::Updated { .. } | UpdateResult::NotNewer)
  }
}

impl std::fmt::Display for UpdateResult {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      UpdateResult::Updated { count, source_name, stale } => {
        write!(f, "Updated with {} modes from {}", count, source_name)?;
        if *stale {
          write!(f, " (forced overwrite of newer local data)")?;
        }
        Ok(())
      }
      UpdateResult::NotNewer => write!(f, "Catalog is already up to date"),
      UpdateResult::NotFound => write!(f, "No catalog file found in the repository"),
      UpdateResult::FetchFailed(reason) => write!(f, "Fetch failed: {}", reason),
      UpdateResult::ParseFailed(reason) => write!(f, "Parse failed: {}", reason),
      UpdateResult::SaveFailed => write!(f, "Failed to save catalog"),
    }
  }
}

/// Newest candidate by name among files with the catalog suffix.
pub fn latest_catalog_file(files: Vec<RemoteFile>, suffix: &str) -> Option<RemoteFile> {
  files.into_iter().filter(|f| f.name.ends_with(suffix)).max_by(|a, b| a.name.cmp(&b.name))
}

/// The remote copy counts as newer when nothing is stored locally, or when it
/// reports a time strictly after the local one.
pub fn is_newer(remote: Option<DateTime<Utc>>, local: Option<DateTime<Utc>>) -> bool {
  match (remote, local) {
    (_, None) => true,
    (Some(remote), Some(local)) => remote > local,
    (None, Some(_)) => false,
  }
}

/// Fetch-parse-save pipeline over a `RemoteSource`. Refreshes are serialized.
pub struct CatalogFetcher<S> {
  source: S,
  store: Arc<CatalogStore>,
  gate: AsyncMutex<()>,
}

impl<S: RemoteSource> CatalogFetcher<S> {
  pub fn new(source: S, store: Arc<CatalogStore>) -> Self {
    Self { source, store, gate: AsyncMutex::new(()) }
  }

  pub fn store(&self) -> &Arc<CatalogStore> {
    &self.store
  }

  pub fn source(&self) -> &S {
    &self.source
  }

  /// Check the remote for a newer catalog and install it. Never replaces the
  /// active catalog unless every step succeeded.
  pub async fn check_for_update(&self, force: bool) -> UpdateResult {
    let _refresh = self.gate.lock().await;
    info!(force, "remote: checking for catalog update");

    let files = match self.source.list_files().await {
      Ok(files) => files,
      Err(e) => {
        let reason = format!("{:#}", e);
        error!(err = %reason, "remote: listing failed");
        return UpdateResult::FetchFailed(reason);
      }
    };

    let Some(latest) = latest_catalog_file(files, &constants().catalog_suffix) else {
      error!("remote: no catalog file found in the repository");
      return UpdateResult::NotFound;
    };

    let remote_time = latest.modified();
    // A timestamp left behind without a usable catalog must not block the refresh.
    let local_time = if self.store.current().is_empty() { None } else { self.store.last_update() };
    let newer = is_newer(remote_time, local_time);
    info!(
      file = %latest.name,
      remote = ?remote_time.map(|t| t.to_rfc3339()),
      local = ?local_time.map(|t| t.to_rfc3339()),
      "remote: latest catalog file"
    );

    if !newer {
      if !force {
        info!("remote: no update needed, local catalog is current");
        return UpdateResult::NotNewer;
      }
      warn!("remote: repository file is not newer than local data, continuing with forced refresh");
    }

    let content = match self.fetch_content(&latest).await {
      Ok(content) => content,
      Err(e) => {
        let reason = format!("{:#}", e);
        error!(err = %reason, "remote: failed to fetch file content");
        return UpdateResult::FetchFailed(reason);
      }
    };
    info!(bytes = content.len(), "remote: file content fetched");

    let catalog = match parse(&content) {
      Ok(catalog) if catalog.is_empty() => {
        error!("remote: parsed file contains no modes");
        return UpdateResult::ParseFailed("no modes found".to_string());
      }
      Ok(catalog) => catalog,
      Err(e) => {
        error!(err = %e, "remote: failed to parse file content");
        return UpdateResult::ParseFailed(e.to_string());
      }
    };
    info!(count = catalog.len(), "remote: parsed modes from file");

    if !self.store.save(&catalog) {
      error!("remote: failed to save catalog");
      return UpdateResult::SaveFailed;
    }

    let count = catalog.len();
    self.store.replace(catalog);
    info!(success = true, count, file = %latest.name, "remote: update successful");
    UpdateResult::Updated { count, source_name: latest.name, stale: !newer }
  }

  async fn fetch_content(&self, file: &RemoteFile) -> Result<String> {
    let url = file.download_url.as_deref().ok_or_else(|| anyhow!("{} has no download URL", file.name))?;
    self.source.fetch_text(url).await
  }
}

/// Minimal one-shot HTTP server for exercising the reqwest paths in tests.
#[cfg(test)]
pub(crate) mod test_http {
  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tokio::net::TcpListener;

  /// Serve `body` to the first `hits` connections. Returns the base URL.
  pub(crate) async fn serve(status: &'static str, body: Vec<u8>, hits: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      for _ in 0..hits {
        let Ok((mut socket, _)) = listener.accept().await else { return };
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await;
        let head = format!("HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n", status, body.len());
        let _ = socket.write_all(head.as_bytes()).await;
        let _ = socket.write_all(&body).await;
        let _ = socket.shutdown().await;
      }
    });
    format!("http://{}", addr)
  }

  pub(crate) fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
  }
}
