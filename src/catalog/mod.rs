//! Catalog data model: mode records and the `customModes` wrapper.

pub mod parser;
mod recover;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::constants;

pub use parser::parse;

/// One capability group entry.
///
/// Catalog files use either a bare tag (`"read"`) or a scoped pair
/// (`["edit", {"fileRegex": "\\.md$"}]`). Matching and display only look at the tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Group {
  Tag(String),
  Scoped(String, Map<String, Value>),
}

impl Group {
  pub fn tag(&self) -> &str {
    match self {
      Group::Tag(tag) | Group::Scoped(tag, _) => tag,
    }
  }
}

impl From<&str> for Group {
  fn from(tag: &str) -> Self {
    Group::Tag(tag.to_string())
  }
}

/// A single entry in the catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeRecord {
  #[serde(default)]
  pub slug: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub role_definition: String,
  #[serde(default)]
  pub groups: Vec<Group>,
  /// Fields this tool doesn't interpret (`customInstructions`, `source`, ...),
  /// kept so exports carry them through untouched.
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl ModeRecord {
  /// Name without the leading decorative emoji, if there is one.
  pub fn plain_name(&self) -> &str {
    match self.name.split_once(' ') {
      Some((head, rest)) if !head.is_empty() && !head.chars().any(|c| c.is_alphanumeric()) => rest,
      _ => &self.name,
    }
  }
}

/// The persisted / transmitted root unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
  pub custom_modes: Vec<ModeRecord>,
}

impl Catalog {
  pub fn new(custom_modes: Vec<ModeRecord>) -> Self {
    Self { custom_modes }
  }

  pub fn len(&self) -> usize {
    self.custom_modes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.custom_modes.is_empty()
  }

  /// Look up a record by slug. Duplicate slugs resolve to the first occurrence.
  pub fn find(&self, slug: &str) -> Option<&ModeRecord> {
    self.custom_modes.iter().find(|m| m.slug == slug)
  }
}

// --- Role definition helpers ---

const TRUNCATION_MARKER: &str = "[...]";

/// Role definition text for the detail pane, with the truncation marker spelled out.
pub fn display_role(text: &str) -> String {
  text.replacen(TRUNCATION_MARKER, "... (truncated)", 1)
}

/// Short preview of a role definition: the first paragraph when it is short,
/// otherwise the first `summary_chars` characters.
pub fn summarize_role(text: &str) -> String {
  if text.is_empty() {
    return "No definition provided.".to_string();
  }
  let limit = constants().summary_chars;
  if let Some(byte) = text.find("\n\n")
    && byte > 0
    && text[..byte].chars().count() < limit
  {
    return format!("{}\n...", &text[..byte]);
  }
  if text.chars().count() > limit {
    let head: String = text.chars().take(limit).collect();
    return format!("{}...", head);
  }
  text.to_string()
}

/// Test fixture shared by the catalog consumers' test modules.
#[cfg(test)]
pub(crate) fn sample_record(slug: &str, name: &str, groups: &[&str]) -> ModeRecord {
  ModeRecord {
    slug: slug.to_string(),
    name: name.to_string(),
    role_definition: format!("Role for {}", slug),
    groups: groups.iter().map(|g| Group::from(*g)).collect(),
    extra: Map::new(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(slug: &str, name: &str, groups: &[&str]) -> ModeRecord {
    sample_record(slug, name, groups)
  }

  #[test]
  fn find_returns_first_duplicate() {
    let mut second = record("dup", "Second", &[]);
    second.role_definition = "later".to_string();
    let catalog = Catalog::new(vec![record("dup", "First", &[]), second]);
    assert_eq!(catalog.find("dup").map(|m| m.name.as_str()), Some("First"));
    assert!(catalog.find("missing").is_none());
  }

  #[test]
  fn scoped_groups_deserialize_and_keep_tag() {
    let json = r#"{"slug":"x","name":"X","roleDefinition":"r","groups":["read",["edit",{"fileRegex":"\\.md$"}]]}"#;
    let rec: ModeRecord = serde_json::from_str(json).unwrap();
    let tags: Vec<&str> = rec.groups.iter().map(Group::tag).collect();
    assert_eq!(tags, vec!["read", "edit"]);
    assert!(matches!(rec.groups[1], Group::Scoped(_, ref opts) if opts.contains_key("fileRegex")));
  }

  #[test]
  fn unknown_fields_survive_round_trip() {
    let json = r#"{"slug":"x","name":"X","roleDefinition":"r","groups":[],"customInstructions":"be nice"}"#;
    let rec: ModeRecord = serde_json::from_str(json).unwrap();
    assert_eq!(rec.extra.get("customInstructions"), Some(&Value::from("be nice")));
    let back = serde_json::to_value(&rec).unwrap();
    assert_eq!(back["customInstructions"], "be nice");
  }

  #[test]
  fn missing_fields_default_to_empty() {
    let rec: ModeRecord = serde_json::from_str(r#"{"slug":"only-slug"}"#).unwrap();
    assert_eq!(rec.slug, "only-slug");
    assert!(rec.name.is_empty());
    assert!(rec.groups.is_empty());
  }

  #[test]
  fn plain_name_strips_leading_emoji() {
    assert_eq!(record("a", "🔧 API Dev", &[]).plain_name(), "API Dev");
    assert_eq!(record("a", "API Dev", &[]).plain_name(), "API Dev");
  }

  #[test]
  fn display_role_expands_marker_once() {
    assert_eq!(display_role("Builds things [...]"), "Builds things ... (truncated)");
    assert_eq!(display_role("no marker"), "no marker");
  }

  #[test]
  fn summarize_role_prefers_short_first_paragraph() {
    assert_eq!(summarize_role("First para.\n\nSecond para."), "First para.\n...");
  }

  #[test]
  fn summarize_role_truncates_long_text() {
    let long = "a".repeat(400);
    let summary = summarize_role(&long);
    assert_eq!(summary.chars().count(), 303);
    assert!(summary.ends_with("..."));
  }

  #[test]
  fn summarize_role_handles_empty_and_short() {
    assert_eq!(summarize_role(""), "No definition provided.");
    assert_eq!(summarize_role("short"), "short");
  }
}
