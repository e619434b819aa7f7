//! Serializing catalogs back out: custom `.roomodes` subsets and developer data dumps.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{error, info};

use crate::catalog::{Catalog, ModeRecord};
use crate::constants::constants;
use crate::devlog::LogEntry;
use crate::store::{CATALOG_KEY, KvStore, LAST_UPDATE_KEY};

#[derive(Debug)]
pub enum ExportError {
  /// Nothing was selected.
  NothingSelected,
  Encode(serde_json::Error),
}

impl std::fmt::Display for ExportError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ExportError::NothingSelected => write!(f, "select at least one mode"),
      ExportError::Encode(e) => write!(f, "failed to encode catalog: {}", e),
    }
  }
}

impl std::error::Error for ExportError {}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CatalogRef<'a> {
  custom_modes: &'a [ModeRecord],
}

/// Wrap `records` as `{"customModes": [...]}` and pretty-print with 2-space indent.
pub fn compile(records: &[ModeRecord]) -> Result<String, ExportError> {
  info!(count = records.len(), "export: compiling catalog file");
  serde_json::to_string_pretty(&CatalogRef { custom_modes: records }).map_err(|e| {
    error!(err = %e, "export: failed to encode catalog");
    ExportError::Encode(e)
  })
}

/// Records whose slug is in `slugs`, in catalog order. Only the first record
/// carrying a duplicated slug is taken.
pub fn select(catalog: &Catalog, slugs: &[String]) -> Vec<ModeRecord> {
  let mut seen = HashSet::new();
  catalog
    .custom_modes
    .iter()
    .filter(|m| slugs.iter().any(|s| *s == m.slug) && seen.insert(m.slug.as_str()))
    .cloned()
    .collect()
}

/// Compile a non-empty selection.
pub fn compile_selection(catalog: &Catalog, slugs: &[String]) -> Result<String, ExportError> {
  let selected = select(catalog, slugs);
  if selected.is_empty() {
    return Err(ExportError::NothingSelected);
  }
  compile(&selected)
}

/// Developer data dump: raw cached catalog, timestamp, theme and log trail.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
  pub roomodes_data: Option<String>,
  pub last_roo_modes_update_time: Option<String>,
  pub theme: Option<String>,
  pub logs: Vec<LogEntry>,
  pub export_time: String,
}

impl ExportBundle {
  pub fn collect(kv: &dyn KvStore, theme: Option<String>, logs: Vec<LogEntry>, now: DateTime<Utc>) -> Self {
    Self {
      roomodes_data: kv.get(CATALOG_KEY).ok().flatten(),
      last_roo_modes_update_time: kv.get(LAST_UPDATE_KEY).ok().flatten(),
      theme,
      logs,
      export_time: now.to_rfc3339(),
    }
  }

  /// `roo-finder-export-YYYY-MM-DD.json`
  pub fn file_name(now: DateTime<Utc>) -> String {
    format!("{}{}.json", constants().export_prefix, now.format("%Y-%m-%d"))
  }

  pub fn to_json(&self) -> Result<String, ExportError> {
    serde_json::to_string_pretty(self).map_err(ExportError::Encode)
  }
}
