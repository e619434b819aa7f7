use anyhow::{Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Serialize, Deserialize, Default, Debug, PartialEq)]
pub struct Config {
  pub theme_name: Option<String>,
  /// `owner/name` of the repository holding catalog files.
  pub repo: Option<String>,
}

pub fn prefs_path() -> Option<PathBuf> {
  ProjectDirs::from("", "", "modefinder").map(|dirs| dirs.config_dir().join("prefs.toml"))
}

impl Config {
  pub fn load() -> Self {
    prefs_path().map(|path| Self::load_from(&path)).unwrap_or_default()
  }

  pub fn load_from(path: &Path) -> Self {
    if let Ok(content) = std::fs::read_to_string(path) {
      match toml::from_str(&content) {
        Ok(config) => return config,
        Err(e) => warn!(err = %e, path = %path.display(), "config: ignoring unreadable prefs"),
      }
    }
    Self::default()
  }

  pub fn save_to(&self, path: &Path) {
    if let Some(dir) = path.parent()
      && std::fs::create_dir_all(dir).is_ok()
      && let Ok(content) = toml::to_string(self)
    {
      let _ = std::fs::write(path, content);
    }
  }
}

/// Split `owner/name` into its parts.
pub fn parse_repo(value: &str) -> Result<(String, String)> {
  let value = value.trim().trim_end_matches('/');
  match value.split_once('/') {
    Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
      Ok((owner.to_string(), name.to_string()))
    }
    _ => bail!("Repository must look like owner/name, got '{}'", value),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_repo_accepts_owner_and_name() {
    assert_eq!(parse_repo("jezweb/roo-commander").unwrap(), ("jezweb".to_string(), "roo-commander".to_string()));
    assert_eq!(parse_repo(" a/b/ ").unwrap(), ("a".to_string(), "b".to_string()));
  }

  #[test]
  fn parse_repo_rejects_malformed() {
    for bad in ["", "solo", "/name", "owner/", "a/b/c"] {
      assert!(parse_repo(bad).is_err(), "{}", bad);
    }
  }

  #[test]
  fn prefs_round_trip_through_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/prefs.toml");
    let config = Config { theme_name: Some("light".to_string()), repo: Some("o/r".to_string()) };
    config.save_to(&path);
    assert_eq!(Config::load_from(&path), config);
  }

  #[test]
  fn unreadable_prefs_fall_back_to_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prefs.toml");
    std::fs::write(&path, "theme_name = [").unwrap();
    assert_eq!(Config::load_from(&path), Config::default());
    assert_eq!(Config::load_from(&dir.path().join("missing.toml")), Config::default());
  }
}
