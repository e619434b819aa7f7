//! Catalog file parsing.
//!
//! Three passes, first success wins:
//! 1. strict JSON (`{"customModes": [...]}`)
//! 2. line-oriented key recovery for files that are "almost JSON"
//! 3. bounded brace-matching recovery (see `recover`)
//!
//! Content is never evaluated. Anything none of the passes understand is a `ParseError`.

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use super::recover;
use super::{Catalog, Group, ModeRecord};

/// Why a catalog could not be recovered from file content.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
  /// Input was empty or whitespace only.
  Empty,
  /// None of the recovery passes produced a record. `cause` is the strict JSON error.
  Unrecoverable { cause: String },
}

impl std::fmt::Display for ParseError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ParseError::Empty => write!(f, "catalog content is empty"),
      ParseError::Unrecoverable { cause } => write!(f, "no mode records could be recovered ({})", cause),
    }
  }
}

impl std::error::Error for ParseError {}

static SLUG_RE: LazyLock<Regex> = LazyLock::new(|| key_regex("slug"));
static NAME_RE: LazyLock<Regex> = LazyLock::new(|| key_regex("name"));
static ROLE_RE: LazyLock<Regex> = LazyLock::new(|| key_regex("roleDefinition"));
static GROUPS_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r#""groups":\s*(\[[^\]]+\])"#).expect("groups pattern is valid"));

fn key_regex(key: &str) -> Regex {
  Regex::new(&format!(r#""{}":\s*"([^"]+)""#, key)).expect("key pattern is valid")
}

/// Parse raw catalog file content.
pub fn parse(content: &str) -> Result<Catalog, ParseError> {
  if content.trim().is_empty() {
    return Err(ParseError::Empty);
  }

  let strict_err = match serde_json::from_str::<Catalog>(content) {
    Ok(catalog) => return Ok(catalog),
    Err(e) => e,
  };
  debug!(err = %strict_err, "parser: strict JSON failed, trying line recovery");

  let records = recover_lines(content);
  if !records.is_empty() {
    debug!(count = records.len(), "parser: line recovery succeeded");
    return Ok(Catalog::new(records));
  }

  if let Some(catalog) = recover::structural(content) {
    debug!(count = catalog.len(), "parser: structural recovery succeeded");
    return Ok(catalog);
  }

  Err(ParseError::Unrecoverable { cause: strict_err.to_string() })
}

/// First capture group of `re` in `line`.
fn capture<'a>(re: &Regex, line: &'a str) -> Option<&'a str> {
  re.captures(line).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// Scan line by line for `"key": value` pairs. A `"slug"` line opens a new record.
fn recover_lines(content: &str) -> Vec<ModeRecord> {
  let mut records = Vec::new();
  let mut current: Option<ModeRecord> = None;

  for line in content.lines() {
    let trimmed = line.trim();
    if trimmed.starts_with("\"slug\":") {
      if let Some(done) = current.take() {
        records.push(done);
      }
      let mut record = ModeRecord::default();
      if let Some(slug) = capture(&SLUG_RE, line) {
        record.slug = slug.to_string();
      }
      current = Some(record);
      continue;
    }

    let Some(record) = current.as_mut() else { continue };
    if trimmed.starts_with("\"name\":") {
      if let Some(name) = capture(&NAME_RE, line) {
        record.name = name.to_string();
      }
    } else if trimmed.starts_with("\"roleDefinition\":") {
      if let Some(role) = capture(&ROLE_RE, line) {
        record.role_definition = role.replace("\\n", "\n");
      }
    } else if trimmed.starts_with("\"groups\":")
      && let Some(raw) = capture(&GROUPS_RE, line)
    {
      record.groups = serde_json::from_str::<Vec<Group>>(raw).unwrap_or_default();
    }
  }

  if let Some(done) = current {
    records.push(done);
  }
  records
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::catalog::sample_record;
  use crate::export::compile;

  #[test]
  fn strict_json_is_preferred() {
    let content = r#"{"customModes":[{"slug":"dev-api","name":"🔧 API Dev","roleDefinition":"Builds APIs","groups":["read","write"]}]}"#;
    let catalog = parse(content).unwrap();
    assert_eq!(catalog.len(), 1);
    let rec = &catalog.custom_modes[0];
    assert_eq!(rec.slug, "dev-api");
    assert_eq!(rec.name, "🔧 API Dev");
    assert_eq!(rec.role_definition, "Builds APIs");
    assert_eq!(rec.groups, vec![Group::from("read"), Group::from("write")]);
  }

  #[test]
  fn strict_json_empty_list_is_a_valid_parse() {
    let catalog = parse(r#"{"customModes": []}"#).unwrap();
    assert!(catalog.is_empty());
  }

  #[test]
  fn compile_then_parse_round_trips() {
    let mut rec = sample_record("agent-x", "🤖 Agent", &["read", "mcp"]);
    rec.role_definition = "Line one\n\n- bullet\n**bold** [...]".to_string();
    let catalog = Catalog::new(vec![rec, sample_record("dev-react", "React", &["edit"])]);
    let text = compile(&catalog.custom_modes).unwrap();
    assert_eq!(parse(&text).unwrap(), catalog);
  }

  #[test]
  fn line_recovery_splits_on_slug_lines() {
    let content = r#"
      customModes: [
        {
          "slug": "a",
          "name": "Alpha",
        },
        {
          "slug": "b",
          "name": "Beta",
        },
      ]
    "#;
    let catalog = parse(content).unwrap();
    let slugs: Vec<&str> = catalog.custom_modes.iter().map(|m| m.slug.as_str()).collect();
    assert_eq!(slugs, vec!["a", "b"]);
    assert_eq!(catalog.custom_modes[0].name, "Alpha");
    assert_eq!(catalog.custom_modes[1].name, "Beta");
  }

  #[test]
  fn line_recovery_unescapes_role_and_parses_groups() {
    let content = concat!(
      "modes = [\n",
      "  \"slug\": \"dev-x\",\n",
      "  \"roleDefinition\": \"One\\nTwo\",\n",
      "  \"groups\": [\"read\", \"edit\"],\n",
      "]\n",
    );
    let catalog = parse(content).unwrap();
    let rec = &catalog.custom_modes[0];
    assert_eq!(rec.role_definition, "One\nTwo");
    assert_eq!(rec.groups, vec![Group::from("read"), Group::from("edit")]);
    assert!(rec.name.is_empty());
  }

  #[test]
  fn line_recovery_bad_groups_default_to_empty() {
    let content = "\"slug\": \"x\",\n\"groups\": [read, edit],\n";
    let catalog = parse(content).unwrap();
    assert!(catalog.custom_modes[0].groups.is_empty());
  }

  #[test]
  fn keys_before_first_slug_are_ignored() {
    let content = "\"name\": \"orphan\",\n\"slug\": \"s\",\n";
    let catalog = parse(content).unwrap();
    assert_eq!(catalog.len(), 1);
    assert!(catalog.custom_modes[0].name.is_empty());
  }

  #[test]
  fn falls_back_to_structural_recovery() {
    let content = r#"export default {customModes: [{"slug": "x", "name": "X", "groups": ["read"]}]};"#;
    let catalog = parse(content).unwrap();
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.custom_modes[0].slug, "x");
  }

  #[test]
  fn never_evaluates_code() {
    let err = parse("(function(){ return 42; })()").unwrap_err();
    assert!(matches!(err, ParseError::Unrecoverable { .. }));
  }

  #[test]
  fn empty_input_is_reported() {
    assert_eq!(parse("  \n "), Err(ParseError::Empty));
  }
}
