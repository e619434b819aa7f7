//! Bounded structural recovery for catalog files that aren't valid JSON.
//!
//! Finds brace-balanced `{...}` spans (string and escape aware) and tries to decode
//! them as a whole catalog or as individual mode records. Scanning stops at
//! `MAX_DEPTH` nesting or `MAX_SPANS` candidate objects.

use super::{Catalog, ModeRecord};

const MAX_DEPTH: usize = 64;
const MAX_SPANS: usize = 4096;

/// A balanced object span: byte range `[start, end)` and its nesting depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
  start: usize,
  end: usize,
  depth: usize,
}

/// Recover a catalog from loosely structured content, or `None`.
pub(super) fn structural(content: &str) -> Option<Catalog> {
  let mut spans = object_spans(content);
  spans.sort_by_key(|s| s.start);

  if let Some(top) = spans.iter().find(|s| s.depth == 0) {
    let slice = &content[top.start..top.end];
    let decoded = serde_json::from_str::<Catalog>(slice)
      .or_else(|_| serde_json::from_str::<Catalog>(&strip_trailing_commas(slice)));
    if let Ok(catalog) = decoded
      && !catalog.is_empty()
    {
      return Some(catalog);
    }
  }

  let mut records = Vec::new();
  let mut covered_to = 0;
  for span in &spans {
    if span.start < covered_to {
      continue;
    }
    let slice = &content[span.start..span.end];
    if !slice.contains("\"slug\"") {
      continue;
    }
    let decoded = serde_json::from_str::<ModeRecord>(slice)
      .or_else(|_| serde_json::from_str::<ModeRecord>(&strip_trailing_commas(slice)));
    if let Ok(record) = decoded
      && !record.slug.is_empty()
    {
      records.push(record);
      covered_to = span.end;
    }
  }

  if records.is_empty() { None } else { Some(Catalog::new(records)) }
}

/// Collect balanced `{...}` spans, innermost first.
fn object_spans(content: &str) -> Vec<Span> {
  let mut spans = Vec::new();
  let mut open: Vec<usize> = Vec::new();
  let mut in_string = false;
  let mut escaped = false;

  for (i, b) in content.bytes().enumerate() {
    if in_string {
      match b {
        _ if escaped => escaped = false,
        b'\\' => escaped = true,
        b'"' => in_string = false,
        _ => {}
      }
      continue;
    }
    match b {
      b'"' => in_string = true,
      b'{' => {
        if open.len() >= MAX_DEPTH {
          break;
        }
        open.push(i);
      }
      b'}' => {
        if let Some(start) = open.pop() {
          spans.push(Span { start, end: i + 1, depth: open.len() });
          if spans.len() >= MAX_SPANS {
            break;
          }
        }
      }
      _ => {}
    }
  }
  spans
}

/// Drop commas that directly precede a closing `}` or `]` (ignoring whitespace).
fn strip_trailing_commas(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  let mut in_string = false;
  let mut escaped = false;
  let mut chars = text.char_indices().peekable();

  while let Some((i, c)) = chars.next() {
    if in_string {
      match c {
        _ if escaped => escaped = false,
        '\\' => escaped = true,
        '"' => in_string = false,
        _ => {}
      }
      out.push(c);
      continue;
    }
    match c {
      '"' => {
        in_string = true;
        out.push(c);
      }
      ',' => {
        let next = text[i + 1..].trim_start().chars().next();
        if !matches!(next, Some('}') | Some(']')) {
          out.push(c);
        }
      }
      _ => out.push(c),
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn spans_respect_strings() {
    let text = r#"{"a": "}{", "b": {"c": 1}}"#;
    let spans = object_spans(text);
    assert_eq!(spans.len(), 2);
    let outer = spans.iter().find(|s| s.depth == 0).unwrap();
    assert_eq!((outer.start, outer.end), (0, text.len()));
  }

  #[test]
  fn trailing_commas_are_removed_outside_strings() {
    assert_eq!(strip_trailing_commas(r#"{"a": [1, 2,], "b": ",}",}"#), r#"{"a": [1, 2], "b": ",}"}"#);
  }

  #[test]
  fn wrapped_catalog_with_trailing_commas() {
    let text = "window.data = {\n  \"customModes\": [\n    {\"slug\": \"x\", \"name\": \"X\",},\n  ],\n};";
    let catalog = structural(text).unwrap();
    assert_eq!(catalog.custom_modes[0].slug, "x");
  }

  #[test]
  fn collects_record_objects_in_source_order() {
    let text = r#"modes: [ {"slug": "b", "groups": [["edit", {"fileRegex": "x"}]]}, {"slug": "a"} ]"#;
    let catalog = structural(text).unwrap();
    let slugs: Vec<&str> = catalog.custom_modes.iter().map(|m| m.slug.as_str()).collect();
    assert_eq!(slugs, vec!["b", "a"]);
  }

  #[test]
  fn nothing_to_recover() {
    assert!(structural("no braces here").is_none());
    assert!(structural("{ \"other\": true }").is_none());
  }

  #[test]
  fn depth_is_bounded() {
    let deep = format!("{}{}", "{".repeat(MAX_DEPTH + 10), "}".repeat(MAX_DEPTH + 10));
    assert!(object_spans(&deep).is_empty());
  }
}
