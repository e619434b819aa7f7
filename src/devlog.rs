//! Developer log trail.
//!
//! A `tracing` layer copies this crate's INFO+ events into a capped, persisted
//! `LogBook` that the log viewer renders. Events carrying `success = true` are
//! recorded with `Severity::Success`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::{self, Write as _};
use std::sync::{Arc, Mutex as StdMutex};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use crate::constants::constants;
use crate::store::{KvStore, LOGS_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Info,
  Success,
  Warning,
  Error,
}

impl Severity {
  pub fn label(self) -> &'static str {
    match self {
      Severity::Info => "info",
      Severity::Success => "success",
      Severity::Warning => "warning",
      Severity::Error => "error",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
  pub timestamp: DateTime<Utc>,
  pub message: String,
  #[serde(alias = "type")]
  pub severity: Severity,
}

/// Most-recent-N log entries, shared between the tracing layer and the UI.
#[derive(Clone)]
pub struct LogBook {
  entries: Arc<StdMutex<VecDeque<LogEntry>>>,
  kv: Option<Arc<dyn KvStore>>,
  capacity: usize,
}

impl LogBook {
  /// A book that is never persisted.
  pub fn detached() -> Self {
    Self { entries: Arc::default(), kv: None, capacity: constants().log_capacity }
  }

  /// Load the persisted trail. A corrupt list starts the book empty.
  pub fn load(kv: Arc<dyn KvStore>) -> Self {
    let capacity = constants().log_capacity;
    let mut entries: VecDeque<LogEntry> = kv
      .get(LOGS_KEY)
      .ok()
      .flatten()
      .and_then(|raw| serde_json::from_str::<Vec<LogEntry>>(&raw).ok())
      .unwrap_or_default()
      .into();
    while entries.len() > capacity {
      entries.pop_front();
    }
    Self { entries: Arc::new(StdMutex::new(entries)), kv: Some(kv), capacity }
  }

  pub fn push(&self, entry: LogEntry) {
    let Ok(mut entries) = self.entries.lock() else { return };
    entries.push_back(entry);
    while entries.len() > self.capacity {
      entries.pop_front();
    }
    if let Some(kv) = &self.kv
      && let Ok(json) = serde_json::to_string(&*entries)
    {
      // Best effort.
      let _ = kv.set(LOGS_KEY, &json);
    }
  }

  #[cfg(test)]
  pub fn log(&self, severity: Severity, message: impl Into<String>) {
    self.push(LogEntry { timestamp: Utc::now(), message: message.into(), severity });
  }

  pub fn entries(&self) -> Vec<LogEntry> {
    self.entries.lock().map(|e| e.iter().cloned().collect()).unwrap_or_default()
  }

  pub fn len(&self) -> usize {
    self.entries.lock().map(|e| e.len()).unwrap_or(0)
  }

  pub fn clear(&self) {
    if let Ok(mut entries) = self.entries.lock() {
      entries.clear();
    }
    if let Some(kv) = &self.kv {
      let _ = kv.remove(LOGS_KEY);
    }
  }
}

// --- Tracing layer ---

#[derive(Default)]
struct EventVisitor {
  message: Option<String>,
  fields: Vec<(String, String)>,
  success: bool,
}

impl Visit for EventVisitor {
  fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
    let rendered = format!("{:?}", value);
    if field.name() == "message" {
      self.message = Some(rendered);
    } else {
      self.fields.push((field.name().to_string(), rendered));
    }
  }

  fn record_str(&mut self, field: &Field, value: &str) {
    if field.name() == "message" {
      self.message = Some(value.to_string());
    } else {
      self.fields.push((field.name().to_string(), value.to_string()));
    }
  }

  fn record_bool(&mut self, field: &Field, value: bool) {
    if field.name() == "success" {
      self.success = value;
    } else {
      self.fields.push((field.name().to_string(), value.to_string()));
    }
  }
}

impl EventVisitor {
  fn render(self) -> String {
    let mut out = self.message.unwrap_or_default();
    for (name, value) in self.fields {
      let _ = write!(out, " {}={}", name, value);
    }
    out
  }
}

/// Feeds this crate's events into a `LogBook`.
pub struct DevLogLayer {
  book: LogBook,
}

impl DevLogLayer {
  pub fn new(book: LogBook) -> Self {
    Self { book }
  }
}

impl<S: Subscriber> Layer<S> for DevLogLayer {
  fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
    let meta = event.metadata();
    if !meta.target().starts_with(env!("CARGO_CRATE_NAME")) {
      return;
    }
    let level = *meta.level();
    if level > Level::INFO {
      return;
    }
    let mut visitor = EventVisitor::default();
    event.record(&mut visitor);
    let severity = match level {
      Level::ERROR => Severity::Error,
      Level::WARN => Severity::Warning,
      _ if visitor.success => Severity::Success,
      _ => Severity::Info,
    };
    self.book.push(LogEntry { timestamp: Utc::now(), message: visitor.render(), severity });
  }
}
