//! Local persistence: a small key-value store plus the catalog held in memory.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::catalog::Catalog;

pub const CATALOG_KEY: &str = "roomodesData";
pub const LAST_UPDATE_KEY: &str = "lastRooModesUpdateTime";
pub const LOGS_KEY: &str = "devConsoleLogs";

/// String key-value persistence.
pub trait KvStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>>;
  fn set(&self, key: &str, value: &str) -> Result<()>;
  fn remove(&self, key: &str) -> Result<()>;
}

/// One file per key inside a directory.
pub struct FileKv {
  dir: PathBuf,
}

impl FileKv {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  fn path(&self, key: &str) -> PathBuf {
    self.dir.join(format!("{}.json", key))
  }
}

impl KvStore for FileKv {
  fn get(&self, key: &str) -> Result<Option<String>> {
    match std::fs::read_to_string(self.path(key)) {
      Ok(value) => Ok(Some(value)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e).with_context(|| format!("Failed to read store key {}", key)),
    }
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    std::fs::create_dir_all(&self.dir).context("Failed to create store directory")?;
    // Write to a temp file, then rename (atomic)
    let path = self.path(key);
    let tmp_path = path.with_extension("json.part");
    std::fs::write(&tmp_path, value).with_context(|| format!("Failed to write store key {}", key))?;
    std::fs::rename(&tmp_path, &path).with_context(|| format!("Failed to finalize store key {}", key))?;
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    match std::fs::remove_file(self.path(key)) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(e).with_context(|| format!("Failed to remove store key {}", key)),
    }
  }
}

/// Process-local store, used with `--ephemeral` and in tests.
#[derive(Default)]
pub struct MemoryKv {
  map: StdMutex<HashMap<String, String>>,
}

impl MemoryKv {
  fn map(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
    self.map.lock().map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
  }
}

impl KvStore for MemoryKv {
  fn get(&self, key: &str) -> Result<Option<String>> {
    Ok(self.map()?.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    self.map()?.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    self.map()?.remove(key);
    Ok(())
  }
}

/// Platform data directory (`~/.local/share/modefinder` on Linux).
pub fn data_dir() -> Result<PathBuf> {
  ProjectDirs::from("", "", "modefinder")
    .map(|dirs| dirs.data_dir().to_path_buf())
    .context("Could not determine a data directory for this platform")
}

/// The active catalog and its persisted copy.
///
/// The in-memory catalog is only ever swapped whole. Consumers either read
/// `current()` or hold a receiver from `subscribe()` to learn about swaps.
pub struct CatalogStore {
  kv: Arc<dyn KvStore>,
  active: watch::Sender<Arc<Catalog>>,
}

impl CatalogStore {
  pub fn new(kv: Arc<dyn KvStore>) -> Self {
    Self { kv, active: watch::Sender::new(Arc::new(Catalog::default())) }
  }

  pub fn kv(&self) -> &Arc<dyn KvStore> {
    &self.kv
  }

  /// Read the persisted catalog. Missing, empty or corrupt data all yield `None`.
  pub fn load(&self) -> Option<Catalog> {
    let raw = match self.kv.get(CATALOG_KEY) {
      Ok(Some(raw)) => raw,
      Ok(None) => {
        info!("store: no cached catalog found");
        return None;
      }
      Err(e) => {
        let reason = format!("{:#}", e);
        warn!(err = %reason, "store: failed to read cached catalog");
        return None;
      }
    };
    match serde_json::from_str::<Catalog>(&raw) {
      Ok(catalog) if catalog.is_empty() => {
        debug!("store: cached catalog is empty, ignoring");
        None
      }
      Ok(catalog) => {
        let last_update = self.last_update().map(|t| t.to_rfc3339());
        info!(count = catalog.len(), last_update = ?last_update, "store: loaded catalog from cache");
        Some(catalog)
      }
      Err(e) => {
        warn!(err = %e, "store: cached catalog is corrupt");
        None
      }
    }
  }

  /// Load the cached catalog and make it active. Returns whether anything was restored.
  pub fn restore(&self) -> bool {
    match self.load() {
      Some(catalog) => {
        self.replace(catalog);
        true
      }
      None => false,
    }
  }

  /// Persist `catalog` with a fresh timestamp. Never fails loudly.
  pub fn save(&self, catalog: &Catalog) -> bool {
    self.save_at(catalog, Utc::now())
  }

  pub(crate) fn save_at(&self, catalog: &Catalog, at: DateTime<Utc>) -> bool {
    let json = match serde_json::to_string(catalog) {
      Ok(json) => json,
      Err(e) => {
        warn!(err = %e, "store: failed to serialize catalog");
        return false;
      }
    };
    let previous = self.kv.get(CATALOG_KEY).ok().flatten();
    let result = self.kv.set(CATALOG_KEY, &json).and_then(|()| {
      self.kv.set(LAST_UPDATE_KEY, &at.to_rfc3339()).inspect_err(|_| {
        // The blob and its timestamp are written together or not at all.
        let rollback = match &previous {
          Some(raw) => self.kv.set(CATALOG_KEY, raw),
          None => self.kv.remove(CATALOG_KEY),
        };
        if let Err(e) = rollback {
          let reason = format!("{:#}", e);
          error!(err = %reason, "store: failed to roll back catalog after timestamp write failed");
        }
      })
    });
    match result {
      Ok(()) => {
        debug!(count = catalog.len(), at = %at.to_rfc3339(), "store: catalog saved");
        true
      }
      Err(e) => {
        let reason = format!("{:#}", e);
        warn!(err = %reason, "store: failed to save catalog");
        false
      }
    }
  }

  /// When the persisted catalog was last written, if known.
  pub fn last_update(&self) -> Option<DateTime<Utc>> {
    let raw = self.kv.get(LAST_UPDATE_KEY).ok().flatten()?;
    DateTime::parse_from_rfc3339(raw.trim()).ok().map(|t| t.with_timezone(&Utc))
  }

  pub fn current(&self) -> Arc<Catalog> {
    self.active.borrow().clone()
  }

  /// Swap the active catalog.
  pub fn replace(&self, catalog: Catalog) {
    info!(count = catalog.len(), "store: active catalog replaced");
    self.active.send_replace(Arc::new(catalog));
  }

  pub fn subscribe(&self) -> watch::Receiver<Arc<Catalog>> {
    self.active.subscribe()
  }

  /// Forget the persisted catalog and its timestamp, and empty the active catalog.
  pub fn clear(&self) -> Result<()> {
    self.kv.remove(CATALOG_KEY)?;
    self.kv.remove(LAST_UPDATE_KEY)?;
    self.replace(Catalog::default());
    info!("store: cache cleared");
    Ok(())
  }
}

/// Write `content` to `path`, creating parent directories.
pub fn write_file(path: &Path, content: &str) -> Result<()> {
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
  }
  std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}
