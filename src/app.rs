use anyhow::Result;
use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use ratatui::widgets::ListState;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, watch};
use tracing::{info, warn};

use crate::catalog::{Catalog, ModeRecord};
use crate::clipboard;
use crate::config::Config;
use crate::constants::constants;
use crate::devlog::LogBook;
use crate::export::{self, ExportBundle, ExportError};
use crate::remote::{CatalogFetcher, RemoteSource, UpdateResult};
use crate::search::{CategoryFilter, SearchOutcome, search};
use crate::store::{CatalogStore, write_file};
use crate::theme::{THEMES, Theme, theme_index};

// --- Types ---

/// Starts a refresh. `true` forces the download even when the remote copy is not newer.
pub type Refresher = Arc<dyn Fn(bool) -> BoxFuture<'static, UpdateResult> + Send + Sync>;

/// Wrap a fetcher so the UI can start refreshes without knowing its source type.
pub fn refresher<S: RemoteSource + 'static>(fetcher: Arc<CatalogFetcher<S>>) -> Refresher {
  Arc::new(move |force| {
    let fetcher = fetcher.clone();
    async move { fetcher.check_for_update(force).await }.boxed()
  })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
  Input,
  Results,
  Detail,
  Logs,
  Confirm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
  Info,
  Success,
  Error,
}

/// Transient status line message, dismissed after a few seconds.
#[derive(Debug, Clone)]
pub struct Notice {
  pub kind: NoticeKind,
  pub text: String,
  at: Instant,
}

/// A yes/no question blocking a destructive action.
pub struct ConfirmPrompt {
  pub title: &'static str,
  pub message: String,
  /// Shown as the in-progress status once the user says yes.
  busy: Option<&'static str>,
  reply: oneshot::Sender<bool>,
  return_mode: AppMode,
}

/// In-flight background work.
#[derive(Default)]
pub(crate) struct AsyncTasks {
  /// `None` means a confirmation was declined.
  pub(crate) refresh_rx: Option<oneshot::Receiver<Option<UpdateResult>>>,
  pub(crate) clear_rx: Option<oneshot::Receiver<Result<bool>>>,
}

pub struct App {
  pub input: String,
  pub cursor_position: usize,
  pub input_scroll: usize,
  pub mode: AppMode,
  pub theme_index: usize,
  pub filter: CategoryFilter,
  pub catalog: Arc<Catalog>,
  catalog_rx: watch::Receiver<Arc<Catalog>>,
  /// Indices into `catalog`. `None` until there is a query or a category.
  pub results: Option<Vec<usize>>,
  pub list_state: ListState,
  /// Slugs selected for a custom export.
  pub marked: BTreeSet<String>,
  pub detail_scroll: u16,
  pub log_scroll: u16,
  /// In-progress work, shown until the task reports back.
  pub status_message: Option<String>,
  pub notice: Option<Notice>,
  pub confirm: Option<ConfirmPrompt>,
  pub should_quit: bool,
  pub logs: LogBook,
  /// Where exported files are written.
  pub export_dir: PathBuf,
  store: Arc<CatalogStore>,
  refresher: Refresher,
  config: Config,
  prefs_path: Option<PathBuf>,
  pub(crate) tasks: AsyncTasks,
}

impl App {
  pub fn new(
    store: Arc<CatalogStore>,
    refresher: Refresher,
    logs: LogBook,
    config: Config,
    prefs_path: Option<PathBuf>,
  ) -> Self {
    let mut catalog_rx = store.subscribe();
    let catalog = catalog_rx.borrow_and_update().clone();
    Self {
      input: String::new(),
      cursor_position: 0,
      input_scroll: 0,
      mode: AppMode::Input,
      theme_index: theme_index(config.theme_name.as_deref()),
      filter: CategoryFilter::All,
      catalog,
      catalog_rx,
      results: None,
      list_state: ListState::default(),
      marked: BTreeSet::new(),
      detail_scroll: 0,
      log_scroll: 0,
      status_message: None,
      notice: None,
      confirm: None,
      should_quit: false,
      logs,
      export_dir: PathBuf::from("."),
      store,
      refresher,
      config,
      prefs_path,
      tasks: AsyncTasks::default(),
    }
  }

  pub fn theme(&self) -> &'static Theme {
    &THEMES[self.theme_index % THEMES.len()]
  }

  pub fn next_theme(&mut self) {
    self.theme_index = (self.theme_index + 1) % THEMES.len();
    self.config.theme_name = Some(self.theme().name.to_string());
    if let Some(ref path) = self.prefs_path {
      self.config.save_to(path);
    }
    info!(theme = self.theme().name, "ui: theme changed");
  }

  // --- Status ---

  pub fn set_notice(&mut self, kind: NoticeKind, text: impl Into<String>) {
    self.notice = Some(Notice { kind, text: text.into(), at: Instant::now() });
  }

  pub fn set_error(&mut self, text: impl Into<String>) {
    self.set_notice(NoticeKind::Error, text);
  }

  pub fn clear_error(&mut self) {
    if self.notice.as_ref().is_some_and(|n| n.kind == NoticeKind::Error) {
      self.notice = None;
    }
  }

  /// Drop the notice once it has been visible long enough.
  pub fn expire_notice(&mut self) {
    if let Some(ref n) = self.notice
      && n.at.elapsed() >= Duration::from_secs(constants().status_secs)
    {
      self.notice = None;
    }
  }

  // --- Search ---

  /// Rows currently listed, as catalog indices.
  pub fn visible(&self) -> &[usize] {
    self.results.as_deref().unwrap_or(&[])
  }

  pub fn selected_record(&self) -> Option<&ModeRecord> {
    let sel = self.list_state.selected()?;
    let idx = *self.visible().get(sel)?;
    self.catalog.custom_modes.get(idx)
  }

  /// Re-run the search against the active catalog and keep the selection in range.
  pub fn run_search(&mut self) {
    let results = match search(&self.catalog, &self.input, self.filter) {
      SearchOutcome::NoQuery => None,
      SearchOutcome::Matches(records) => Some(indices_of(&self.catalog, &records)),
    };
    self.results = results;

    let count = self.visible().len();
    if count == 0 {
      self.list_state.select(None);
    } else {
      let sel = self.list_state.selected().unwrap_or(0).min(count - 1);
      self.list_state.select(Some(sel));
    }
  }

  pub fn next_category(&mut self) {
    self.filter = self.filter.next();
    self.list_state.select(Some(0));
    self.run_search();
  }

  pub fn select_next(&mut self) {
    let count = self.visible().len();
    if count > 0 {
      let i = self.list_state.selected().map_or(0, |i| (i + 1) % count);
      self.list_state.select(Some(i));
    }
  }

  pub fn select_previous(&mut self) {
    let count = self.visible().len();
    if count > 0 {
      let i = self.list_state.selected().map_or(0, |i| if i == 0 { count - 1 } else { i - 1 });
      self.list_state.select(Some(i));
    }
  }

  // --- Selection for export ---

  pub fn toggle_mark(&mut self) {
    let Some(slug) = self.selected_record().map(|r| r.slug.clone()) else { return };
    if !self.marked.remove(&slug) {
      self.marked.insert(slug);
    }
  }

  /// Mark every listed record, or unmark them all when they already are.
  pub fn toggle_mark_all(&mut self) {
    let slugs: Vec<String> =
      self.visible().iter().filter_map(|&i| self.catalog.custom_modes.get(i)).map(|r| r.slug.clone()).collect();
    if slugs.is_empty() {
      return;
    }
    if slugs.iter().all(|s| self.marked.contains(s)) {
      for slug in &slugs {
        self.marked.remove(slug);
      }
      info!(count = slugs.len(), "ui: modes deselected");
    } else {
      info!(count = slugs.len(), "ui: modes selected");
      self.marked.extend(slugs);
    }
  }

  pub fn export_marked(&mut self) {
    let slugs: Vec<String> = self.marked.iter().cloned().collect();
    let text = match export::compile_selection(&self.catalog, &slugs) {
      Ok(text) => text,
      Err(ExportError::NothingSelected) => {
        warn!("export: attempted with no modes selected");
        self.set_error("Select at least one mode first (Space marks a mode)");
        return;
      }
      Err(e) => {
        self.set_error(e.to_string());
        return;
      }
    };
    let count = export::select(&self.catalog, &slugs).len();
    let path = self.export_dir.join(&constants().custom_file_name);
    match write_file(&path, &text) {
      Ok(()) => {
        info!(success = true, count, path = %path.display(), "export: custom catalog written");
        self.set_notice(NoticeKind::Success, format!("Wrote {} modes to {}", count, path.display()));
      }
      Err(e) => self.set_error(format!("{:#}", e)),
    }
  }

  pub fn export_bundle(&mut self) {
    let now = Utc::now();
    let bundle =
      ExportBundle::collect(self.store.kv().as_ref(), Some(self.theme().name.to_string()), self.logs.entries(), now);
    let path = self.export_dir.join(ExportBundle::file_name(now));
    let written = bundle.to_json().map_err(anyhow::Error::from).and_then(|json| write_file(&path, &json));
    match written {
      Ok(()) => {
        info!(success = true, path = %path.display(), "devlog: data exported");
        self.set_notice(NoticeKind::Success, format!("Exported data to {}", path.display()));
      }
      Err(e) => {
        let reason = format!("{:#}", e);
        warn!(err = %reason, "devlog: data export failed");
        self.set_error(reason);
      }
    }
  }

  pub fn copy_selected_slug(&mut self) {
    let Some(slug) = self.selected_record().map(|r| r.slug.clone()) else { return };
    match clipboard::copy(&slug) {
      Ok(()) => self.set_notice(NoticeKind::Success, format!("Copied '{}'", slug)),
      Err(e) => self.set_error(format!("Copy failed: {:#}", e)),
    }
  }

  pub fn clear_logs(&mut self) {
    self.logs.clear();
    self.log_scroll = 0;
    info!("devlog: logs cleared");
  }

  // --- Confirmation ---

  /// Open a yes/no prompt. The receiver resolves when the user answers
  /// (a dropped prompt reads as "no").
  pub fn ask(
    &mut self,
    title: &'static str,
    message: impl Into<String>,
    busy: Option<&'static str>,
  ) -> oneshot::Receiver<bool> {
    let (reply, rx) = oneshot::channel();
    // A replaced prompt resolves as declined when its sender drops.
    let return_mode = match self.confirm.take() {
      Some(old) => old.return_mode,
      None => self.mode,
    };
    self.confirm = Some(ConfirmPrompt { title, message: message.into(), busy, reply, return_mode });
    self.mode = AppMode::Confirm;
    rx
  }

  pub fn answer(&mut self, yes: bool) {
    let Some(prompt) = self.confirm.take() else { return };
    self.mode = prompt.return_mode;
    if yes && let Some(busy) = prompt.busy {
      self.status_message = Some(busy.to_string());
    }
    let _ = prompt.reply.send(yes);
  }

  // --- Refresh ---

  pub fn refresh_pending(&self) -> bool {
    self.tasks.refresh_rx.is_some()
  }

  pub fn trigger_refresh(&mut self) {
    if self.refresh_pending() {
      self.set_notice(NoticeKind::Info, "A refresh is already running");
      return;
    }
    self.clear_error();
    self.status_message = Some("Checking for catalog updates…".to_string());
    let refresh = self.refresher.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let _ = tx.send(Some(refresh(false).await));
    });
    self.tasks.refresh_rx = Some(rx);
  }

  pub fn trigger_force_refresh(&mut self) {
    if self.refresh_pending() {
      self.set_notice(NoticeKind::Info, "A refresh is already running");
      return;
    }
    let answer = self.ask(
      "Force Refresh",
      "Download the latest catalog even if the local copy is newer. Local data will be overwritten.",
      Some("Force refreshing catalog…"),
    );
    let refresh = self.refresher.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let outcome = if answer.await.unwrap_or(false) { Some(refresh(true).await) } else { None };
      let _ = tx.send(outcome);
    });
    self.tasks.refresh_rx = Some(rx);
  }

  pub fn trigger_clear_cache(&mut self) {
    if self.tasks.clear_rx.is_some() {
      return;
    }
    let answer =
      self.ask("Clear Cache", "Remove the cached catalog, its timestamp and all logs.", Some("Clearing cache…"));
    let store = self.store.clone();
    let logs = self.logs.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let result = if answer.await.unwrap_or(false) {
        store.clear().map(|()| {
          logs.clear();
          info!("devlog: cache cleared");
          true
        })
      } else {
        Ok(false)
      };
      let _ = tx.send(result);
    });
    self.tasks.clear_rx = Some(rx);
  }

  fn finish_refresh(&mut self, outcome: Option<UpdateResult>) {
    self.status_message = None;
    match outcome {
      None => self.set_notice(NoticeKind::Info, "Force refresh cancelled"),
      Some(result) => {
        let kind = if result.is_updated() {
          NoticeKind::Success
        } else if result.is_failure() {
          NoticeKind::Error
        } else {
          NoticeKind::Info
        };
        self.set_notice(kind, result.to_string());
      }
    }
  }

  /// Poll background tasks and the catalog watch. Called once per frame.
  pub fn check_pending(&mut self) {
    if self.catalog_rx.has_changed().unwrap_or(false) {
      self.catalog = self.catalog_rx.borrow_and_update().clone();
      let catalog = self.catalog.clone();
      self.marked.retain(|slug| catalog.find(slug).is_some());
      self.run_search();
    }

    if let Some(mut rx) = self.tasks.refresh_rx.take() {
      match rx.try_recv() {
        Ok(outcome) => self.finish_refresh(outcome),
        Err(oneshot::error::TryRecvError::Empty) => {
          self.tasks.refresh_rx = Some(rx);
        }
        Err(oneshot::error::TryRecvError::Closed) => {
          self.status_message = None;
          self.set_error("Refresh task failed.");
        }
      }
    }

    if let Some(mut rx) = self.tasks.clear_rx.take() {
      match rx.try_recv() {
        Ok(Ok(true)) => {
          self.status_message = None;
          self.log_scroll = 0;
          self.set_notice(NoticeKind::Success, "Cache cleared");
        }
        Ok(Ok(false)) => self.set_notice(NoticeKind::Info, "Clear cache cancelled"),
        Ok(Err(e)) => {
          self.status_message = None;
          self.set_error(format!("Clear cache failed: {:#}", e));
        }
        Err(oneshot::error::TryRecvError::Empty) => {
          self.tasks.clear_rx = Some(rx);
        }
        Err(oneshot::error::TryRecvError::Closed) => {
          self.status_message = None;
          self.set_error("Clear cache task failed.");
        }
      }
    }

    self.expire_notice();
  }
}

/// Map search hits back to catalog positions. `records` must be in catalog order.
fn indices_of(catalog: &Catalog, records: &[&ModeRecord]) -> Vec<usize> {
  let mut out = Vec::with_capacity(records.len());
  let mut all = catalog.custom_modes.iter().enumerate();
  for record in records {
    if let Some((i, _)) = all.by_ref().find(|(_, m)| std::ptr::eq(*m, *record)) {
      out.push(i);
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::catalog::sample_record;
  use crate::search::Category;
  use crate::store::MemoryKv;
  use std::sync::atomic::{AtomicUsize, Ordering};

  fn catalog() -> Catalog {
    Catalog::new(vec![
      sample_record("dev-api", "🔧 API Developer", &["read", "edit"]),
      sample_record("design-ui", "🎨 UI Designer", &["read"]),
      sample_record("dev-react", "⚛️ React Developer", &["browser"]),
    ])
  }

  fn fixed_refresher(result: UpdateResult, calls: Arc<AtomicUsize>) -> Refresher {
    Arc::new(move |_force| {
      calls.fetch_add(1, Ordering::SeqCst);
      let result = result.clone();
      async move { result }.boxed()
    })
  }

  fn app_with(result: UpdateResult) -> (App, Arc<CatalogStore>, Arc<AtomicUsize>) {
    let store = Arc::new(CatalogStore::new(Arc::new(MemoryKv::default())));
    store.replace(catalog());
    let calls = Arc::new(AtomicUsize::new(0));
    let app = App::new(store.clone(), fixed_refresher(result, calls.clone()), LogBook::detached(), Config::default(), None);
    (app, store, calls)
  }

  fn app() -> App {
    app_with(UpdateResult::NotNewer).0
  }

  fn listed_slugs(app: &App) -> Vec<String> {
    app.visible().iter().map(|&i| app.catalog.custom_modes[i].slug.clone()).collect()
  }

  async fn settle(app: &mut App) {
    for _ in 0..20 {
      tokio::task::yield_now().await;
      app.check_pending();
    }
  }

  #[test]
  fn empty_query_lists_nothing() {
    let mut app = app();
    app.run_search();
    assert!(app.results.is_none());
    assert!(app.selected_record().is_none());
  }

  #[test]
  fn typing_filters_and_selects_first() {
    let mut app = app();
    app.input = "dev".to_string();
    app.run_search();
    assert_eq!(listed_slugs(&app), vec!["dev-api", "dev-react"]);
    assert_eq!(app.selected_record().map(|r| r.slug.as_str()), Some("dev-api"));
  }

  #[test]
  fn category_cycle_restricts_results() {
    let mut app = app();
    app.next_category();
    assert_eq!(app.filter, CategoryFilter::Only(Category::Design));
    assert_eq!(listed_slugs(&app), vec!["design-ui"]);
  }

  #[test]
  fn selection_wraps_and_clamps() {
    let mut app = app();
    app.input = "dev".to_string();
    app.run_search();
    app.select_previous();
    assert_eq!(app.list_state.selected(), Some(1));
    app.select_next();
    assert_eq!(app.list_state.selected(), Some(0));
    app.list_state.select(Some(1));
    app.input = "api".to_string();
    app.run_search();
    assert_eq!(app.list_state.selected(), Some(0));
  }

  #[test]
  fn marking_toggles_and_mark_all_flips() {
    let mut app = app();
    app.input = "dev".to_string();
    app.run_search();
    app.toggle_mark();
    assert!(app.marked.contains("dev-api"));
    app.toggle_mark();
    assert!(app.marked.is_empty());
    app.toggle_mark_all();
    assert_eq!(app.marked.len(), 2);
    app.toggle_mark_all();
    assert!(app.marked.is_empty());
  }

  #[test]
  fn export_without_marks_is_an_error() {
    let mut app = app();
    let dir = tempfile::tempdir().unwrap();
    app.export_dir = dir.path().to_path_buf();
    app.export_marked();
    assert_eq!(app.notice.as_ref().map(|n| n.kind), Some(NoticeKind::Error));
    assert!(!dir.path().join(".roomodes").exists());
  }

  #[test]
  fn export_marked_writes_custom_file() {
    let mut app = app();
    let dir = tempfile::tempdir().unwrap();
    app.export_dir = dir.path().to_path_buf();
    app.marked.insert("dev-react".to_string());
    app.marked.insert("design-ui".to_string());
    app.export_marked();
    assert_eq!(app.notice.as_ref().map(|n| n.kind), Some(NoticeKind::Success));
    let written = crate::catalog::parse(&std::fs::read_to_string(dir.path().join(".roomodes")).unwrap()).unwrap();
    let slugs: Vec<&str> = written.custom_modes.iter().map(|m| m.slug.as_str()).collect();
    assert_eq!(slugs, vec!["design-ui", "dev-react"]);
  }

  #[test]
  fn export_counts_records_written_for_duplicate_slugs() {
    let store = Arc::new(CatalogStore::new(Arc::new(MemoryKv::default())));
    store.replace(Catalog::new(vec![sample_record("dup", "First", &[]), sample_record("dup", "Second", &[])]));
    let calls = Arc::new(AtomicUsize::new(0));
    let mut app = App::new(store, fixed_refresher(UpdateResult::NotNewer, calls), LogBook::detached(), Config::default(), None);
    let dir = tempfile::tempdir().unwrap();
    app.export_dir = dir.path().to_path_buf();
    app.marked.insert("dup".to_string());
    app.export_marked();
    assert!(app.notice.as_ref().is_some_and(|n| n.text.starts_with("Wrote 1 modes")));
    let written = crate::catalog::parse(&std::fs::read_to_string(dir.path().join(".roomodes")).unwrap()).unwrap();
    assert_eq!(written.len(), 1);
    assert_eq!(written.custom_modes[0].name, "First");
  }

  #[test]
  fn bundle_export_lands_in_export_dir() {
    let mut app = app();
    let dir = tempfile::tempdir().unwrap();
    app.export_dir = dir.path().to_path_buf();
    app.export_bundle();
    let name = ExportBundle::file_name(Utc::now());
    assert!(dir.path().join(name).exists());
  }

  #[test]
  fn theme_cycles_without_prefs_path() {
    let mut app = app();
    let first = app.theme().name;
    app.next_theme();
    assert_ne!(app.theme().name, first);
    assert_eq!(app.config.theme_name.as_deref(), Some(app.theme().name));
  }

  #[test]
  fn answer_restores_previous_mode() {
    let mut app = app();
    app.mode = AppMode::Logs;
    let mut rx = app.ask("Title", "Sure?", Some("Working…"));
    assert_eq!(app.mode, AppMode::Confirm);
    app.answer(true);
    assert_eq!(app.mode, AppMode::Logs);
    assert_eq!(rx.try_recv(), Ok(true));
    assert_eq!(app.status_message.as_deref(), Some("Working…"));
  }

  #[tokio::test]
  async fn refresh_reports_outcome_and_guards_reentry() {
    let (mut app, _store, calls) =
      app_with(UpdateResult::Updated { count: 3, source_name: "a.roomodes".to_string(), stale: false });
    app.trigger_refresh();
    assert!(app.refresh_pending());
    app.trigger_refresh();
    settle(&mut app).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!app.refresh_pending());
    assert!(app.status_message.is_none());
    assert_eq!(app.notice.as_ref().map(|n| n.kind), Some(NoticeKind::Success));
  }

  #[tokio::test]
  async fn declined_force_refresh_never_fetches() {
    let (mut app, _store, calls) = app_with(UpdateResult::NotNewer);
    app.trigger_force_refresh();
    assert_eq!(app.mode, AppMode::Confirm);
    app.answer(false);
    settle(&mut app).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(app.notice.as_ref().map(|n| n.text.as_str()), Some("Force refresh cancelled"));
  }

  #[tokio::test]
  async fn accepted_force_refresh_fetches() {
    let (mut app, _store, calls) = app_with(UpdateResult::FetchFailed("offline".to_string()));
    app.trigger_force_refresh();
    app.answer(true);
    settle(&mut app).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(app.notice.as_ref().map(|n| n.kind), Some(NoticeKind::Error));
  }

  #[tokio::test]
  async fn catalog_swap_reruns_search_and_prunes_marks() {
    let (mut app, store, _calls) = app_with(UpdateResult::NotNewer);
    app.input = "dev".to_string();
    app.run_search();
    app.marked.insert("dev-react".to_string());
    store.replace(Catalog::new(vec![sample_record("dev-go", "Go Developer", &[])]));
    app.check_pending();
    assert_eq!(listed_slugs(&app), vec!["dev-go"]);
    assert!(app.marked.is_empty());
  }

  #[tokio::test]
  async fn clear_cache_after_confirmation() {
    let (mut app, store, _calls) = app_with(UpdateResult::NotNewer);
    store.save(&catalog());
    app.logs.log(crate::devlog::Severity::Info, "before");
    app.trigger_clear_cache();
    app.answer(true);
    settle(&mut app).await;
    assert!(store.load().is_none());
    assert!(app.catalog.is_empty());
    assert_eq!(app.logs.len(), 0);
    assert_eq!(app.notice.as_ref().map(|n| n.text.as_str()), Some("Cache cleared"));
  }
}
