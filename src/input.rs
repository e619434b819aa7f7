use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, AppMode};

// --- Helpers ---

/// Convert a char index to a byte offset within the string.
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
  s.char_indices().nth(char_idx).map_or(s.len(), |(i, _)| i)
}

// --- Event Handling ---

pub fn handle_key_event(app: &mut App, key: KeyEvent) {
  let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

  if ctrl && key.code == KeyCode::Char('c') {
    app.should_quit = true;
    return;
  }

  // The prompt owns the keyboard until answered.
  if app.mode == AppMode::Confirm {
    match key.code {
      KeyCode::Char('y') | KeyCode::Char('Y') => app.answer(true),
      KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => app.answer(false),
      _ => {}
    }
    return;
  }

  if ctrl {
    match key.code {
      KeyCode::Char('t') => app.next_theme(),
      KeyCode::Char('r') => app.trigger_refresh(),
      KeyCode::Char('f') => app.trigger_force_refresh(),
      KeyCode::Char('e') => app.export_marked(),
      KeyCode::Char('y') => app.copy_selected_slug(),
      KeyCode::Char('l') => {
        app.mode = if app.mode == AppMode::Logs { AppMode::Input } else { AppMode::Logs };
      }
      _ => {}
    }
    return;
  }

  match app.mode {
    AppMode::Input => handle_input_key(app, key),
    AppMode::Results => handle_results_key(app, key),
    AppMode::Detail => handle_detail_key(app, key),
    AppMode::Logs => handle_logs_key(app, key),
    AppMode::Confirm => {}
  }
}

fn handle_input_key(app: &mut App, key: KeyEvent) {
  app.clear_error();
  match key.code {
    KeyCode::Enter | KeyCode::Down => {
      if !app.visible().is_empty() {
        app.mode = AppMode::Results;
      } else if app.results.is_some() {
        app.set_error("No modes match your search");
      }
    }
    KeyCode::Tab => app.next_category(),
    KeyCode::Char(c) => {
      let byte_idx = char_to_byte_index(&app.input, app.cursor_position);
      app.input.insert(byte_idx, c);
      app.cursor_position += 1;
      app.run_search();
    }
    KeyCode::Backspace => {
      if app.cursor_position > 0 {
        app.cursor_position -= 1;
        let byte_idx = char_to_byte_index(&app.input, app.cursor_position);
        app.input.remove(byte_idx);
        app.run_search();
      }
    }
    KeyCode::Delete => {
      if app.cursor_position < app.input.chars().count() {
        let byte_idx = char_to_byte_index(&app.input, app.cursor_position);
        app.input.remove(byte_idx);
        app.run_search();
      }
    }
    KeyCode::Left => {
      app.cursor_position = app.cursor_position.saturating_sub(1);
    }
    KeyCode::Right => {
      if app.cursor_position < app.input.chars().count() {
        app.cursor_position += 1;
      }
    }
    KeyCode::Home => {
      app.cursor_position = 0;
    }
    KeyCode::End => {
      app.cursor_position = app.input.chars().count();
    }
    KeyCode::Esc => {
      if !app.input.is_empty() {
        app.input.clear();
        app.cursor_position = 0;
        app.input_scroll = 0;
        app.run_search();
      } else if !app.visible().is_empty() {
        app.mode = AppMode::Results;
      } else {
        app.should_quit = true;
      }
    }
    _ => {}
  }
}

fn handle_results_key(app: &mut App, key: KeyEvent) {
  match key.code {
    KeyCode::Enter => {
      if app.selected_record().is_some() {
        app.detail_scroll = 0;
        app.mode = AppMode::Detail;
      }
    }
    KeyCode::Char(' ') => {
      app.toggle_mark();
      app.select_next();
    }
    KeyCode::Char('a') => app.toggle_mark_all(),
    KeyCode::Tab => app.next_category(),
    KeyCode::Down | KeyCode::Char('j') => app.select_next(),
    KeyCode::Up | KeyCode::Char('k') => app.select_previous(),
    KeyCode::Esc | KeyCode::Char('/') => {
      app.mode = AppMode::Input;
    }
    _ => {}
  }
}

fn handle_detail_key(app: &mut App, key: KeyEvent) {
  match key.code {
    KeyCode::Down | KeyCode::Char('j') => {
      app.detail_scroll = app.detail_scroll.saturating_add(1);
    }
    KeyCode::Up | KeyCode::Char('k') => {
      app.detail_scroll = app.detail_scroll.saturating_sub(1);
    }
    KeyCode::Char(' ') => app.toggle_mark(),
    KeyCode::Esc | KeyCode::Enter | KeyCode::Backspace => {
      app.mode = AppMode::Results;
    }
    _ => {}
  }
}

fn handle_logs_key(app: &mut App, key: KeyEvent) {
  match key.code {
    KeyCode::Down | KeyCode::Char('j') => {
      app.log_scroll = app.log_scroll.saturating_add(1);
    }
    KeyCode::Up | KeyCode::Char('k') => {
      app.log_scroll = app.log_scroll.saturating_sub(1);
    }
    KeyCode::Char('c') => app.clear_logs(),
    KeyCode::Char('x') => app.trigger_clear_cache(),
    KeyCode::Char('d') => app.export_bundle(),
    KeyCode::Esc => {
      app.mode = AppMode::Input;
    }
    _ => {}
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::app::refresher;
  use crate::catalog::{Catalog, sample_record};
  use crate::config::Config;
  use crate::devlog::LogBook;
  use crate::remote::{CatalogFetcher, GitHubSource};
  use crate::store::{CatalogStore, MemoryKv};
  use std::sync::Arc;

  // --- char_to_byte_index ---

  #[test]
  fn char_to_byte_ascii() {
    assert_eq!(char_to_byte_index("hello", 0), 0);
    assert_eq!(char_to_byte_index("hello", 3), 3);
    assert_eq!(char_to_byte_index("hello", 5), 5); // past end
  }

  #[test]
  fn char_to_byte_multibyte() {
    let s = "aé日"; // a=1 byte, é=2 bytes, 日=3 bytes
    assert_eq!(char_to_byte_index(s, 0), 0);
    assert_eq!(char_to_byte_index(s, 1), 1);
    assert_eq!(char_to_byte_index(s, 2), 3);
    assert_eq!(char_to_byte_index(s, 3), 6);
  }

  #[test]
  fn char_to_byte_empty() {
    assert_eq!(char_to_byte_index("", 0), 0);
    assert_eq!(char_to_byte_index("", 5), 0);
  }

  // --- key handling ---

  fn app() -> App {
    let store = Arc::new(CatalogStore::new(Arc::new(MemoryKv::default())));
    store.replace(Catalog::new(vec![
      sample_record("dev-api", "🔧 API Developer", &["read"]),
      sample_record("design-ui", "🎨 UI Designer", &["read"]),
    ]));
    let source = GitHubSource::with_client(reqwest::Client::new(), "http://127.0.0.1:9", "o", "r");
    let fetcher = Arc::new(CatalogFetcher::new(source, store.clone()));
    App::new(store, refresher(fetcher), LogBook::detached(), Config::default(), None)
  }

  fn press(app: &mut App, code: KeyCode) {
    handle_key_event(app, KeyEvent::new(code, KeyModifiers::NONE));
  }

  fn type_str(app: &mut App, s: &str) {
    for c in s.chars() {
      press(app, KeyCode::Char(c));
    }
  }

  #[test]
  fn typing_searches_live() {
    let mut app = app();
    type_str(&mut app, "desi");
    assert_eq!(app.input, "desi");
    assert_eq!(app.visible().len(), 1);
    press(&mut app, KeyCode::Backspace);
    press(&mut app, KeyCode::Backspace);
    press(&mut app, KeyCode::Backspace);
    press(&mut app, KeyCode::Backspace);
    assert!(app.results.is_none());
  }

  #[test]
  fn enter_moves_to_results_then_detail() {
    let mut app = app();
    type_str(&mut app, "ui");
    press(&mut app, KeyCode::Enter);
    assert_eq!(app.mode, AppMode::Results);
    press(&mut app, KeyCode::Enter);
    assert_eq!(app.mode, AppMode::Detail);
    press(&mut app, KeyCode::Esc);
    assert_eq!(app.mode, AppMode::Results);
    press(&mut app, KeyCode::Esc);
    assert_eq!(app.mode, AppMode::Input);
  }

  #[test]
  fn enter_with_no_matches_reports() {
    let mut app = app();
    type_str(&mut app, "zzz");
    press(&mut app, KeyCode::Enter);
    assert_eq!(app.mode, AppMode::Input);
    assert!(app.notice.is_some());
  }

  #[test]
  fn space_marks_in_results() {
    let mut app = app();
    type_str(&mut app, "dev");
    press(&mut app, KeyCode::Down);
    press(&mut app, KeyCode::Char(' '));
    assert!(app.marked.contains("dev-api"));
  }

  #[test]
  fn esc_clears_then_quits() {
    let mut app = app();
    type_str(&mut app, "x");
    press(&mut app, KeyCode::Esc);
    assert!(app.input.is_empty());
    assert!(!app.should_quit);
    press(&mut app, KeyCode::Esc);
    assert!(app.should_quit);
  }

  #[test]
  fn ctrl_l_toggles_log_viewer() {
    let mut app = app();
    let ctrl_l = KeyEvent::new(KeyCode::Char('l'), KeyModifiers::CONTROL);
    handle_key_event(&mut app, ctrl_l);
    assert_eq!(app.mode, AppMode::Logs);
    handle_key_event(&mut app, ctrl_l);
    assert_eq!(app.mode, AppMode::Input);
  }

  #[tokio::test]
  async fn confirm_prompt_swallows_other_keys() {
    let mut app = app();
    handle_key_event(&mut app, KeyEvent::new(KeyCode::Char('f'), KeyModifiers::CONTROL));
    assert_eq!(app.mode, AppMode::Confirm);
    type_str(&mut app, "abc");
    assert!(app.input.is_empty());
    press(&mut app, KeyCode::Char('n'));
    assert_eq!(app.mode, AppMode::Input);
    assert!(app.confirm.is_none());
  }
}
