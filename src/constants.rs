//! Application constants loaded from `constants.ron` at compile time.
//!
//! The RON file is embedded via `include_str!` so it's always available,
//! no runtime file I/O. Parsed once on first access via `LazyLock`.

use serde::Deserialize;
use std::sync::LazyLock;

/// All tuneable application constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  // Remote catalog repository
  pub api_base: String,
  pub repo_owner: String,
  pub repo_name: String,
  pub catalog_suffix: String,
  pub user_agent: String,
  pub http_timeout_secs: u64,

  // Local state
  pub log_capacity: usize,
  pub custom_file_name: String,
  pub export_prefix: String,

  // Presentation
  pub summary_chars: usize,
  pub status_secs: u64,
  pub progress_interval_ms: u64,
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; if it's malformed this is a build-time error.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn embedded_constants_parse() {
    let c = constants();
    assert_eq!(c.catalog_suffix, ".roomodes");
    assert_eq!(c.log_capacity, 100);
    assert!(c.summary_chars > 0);
  }
}
