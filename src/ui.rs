use ratatui::{
  Frame,
  layout::{Alignment, Constraint, Flex, Layout, Rect},
  style::{Modifier, Style, Stylize},
  text::{Line, Span},
  widgets::{Block, BorderType, Clear, List, ListItem, Padding, Paragraph, Wrap},
};

use crate::app::{App, AppMode, NoticeKind};
use crate::catalog::{ModeRecord, display_role, summarize_role};
use crate::devlog::Severity;
use crate::search::Category;
use crate::theme::Theme;

// --- Helpers ---

/// Compute the display width of the first `n` chars (accounting for double-width CJK).
pub fn display_width(s: &str, n: usize) -> usize {
  use unicode_width::UnicodeWidthChar;
  s.chars().take(n).map(|c| c.width().unwrap_or(0)).sum()
}

/// Truncate a string to `max_width` display columns, appending "…" if truncated.
fn truncate_str(s: &str, max_width: usize) -> String {
  use unicode_width::UnicodeWidthChar;
  if display_width(s, usize::MAX) <= max_width {
    return s.to_string();
  }
  let mut out = String::new();
  let mut used = 0;
  for c in s.chars() {
    let w = c.width().unwrap_or(0);
    if used + w + 1 > max_width {
      break;
    }
    used += w;
    out.push(c);
  }
  if max_width > 0 {
    out.push('…');
  }
  out
}

/// Fit `name` between the mark and the right-hand column. Returns the name
/// cell and the padding that ends the row at exactly `inner_w` columns.
fn name_cell(mark: &str, name: &str, right: &str, inner_w: usize) -> (String, usize) {
  let fixed = display_width(mark, usize::MAX) + display_width(right, usize::MAX);
  let name = truncate_str(name, inner_w.saturating_sub(fixed + 2));
  let gap = inner_w.saturating_sub(fixed + display_width(&name, usize::MAX));
  (name, gap)
}

fn panel<'a>(theme: &Theme, title: impl Into<Line<'a>>) -> Block<'a> {
  Block::bordered()
    .title(title)
    .title_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(theme.border))
}

// --- UI Rendering ---

pub fn ui(frame: &mut Frame, app: &mut App) {
  let theme = app.theme();

  frame.render_widget(Block::default().style(Style::default().bg(theme.bg)), frame.area());

  let [header_area, main_area, status_area, input_area, footer_area] = Layout::vertical([
    Constraint::Length(1),
    Constraint::Min(3),
    Constraint::Length(1),
    Constraint::Length(3),
    Constraint::Length(1),
  ])
  .areas(frame.area());

  render_header(frame, app, header_area);
  render_main(frame, app, main_area);
  render_status(frame, app, status_area);
  render_input(frame, app, input_area);
  render_footer(frame, app, footer_area);

  if app.mode == AppMode::Confirm {
    render_confirm(frame, app);
  }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let left = Line::from(vec![
    Span::styled(" ◆ modefinder ", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)),
    Span::styled(format!("{} modes", app.catalog.len()), Style::default().fg(theme.muted)),
  ]);
  frame.render_widget(left, area);

  let version = format!("v{} ", env!("CARGO_PKG_VERSION"));
  let right = Line::from(Span::styled(&version, Style::default().fg(theme.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(version.len() as u16), width: version.len() as u16, ..area };
  frame.render_widget(right, right_area);
}

fn render_main(frame: &mut Frame, app: &mut App, area: Rect) {
  match app.mode {
    AppMode::Logs => render_logs(frame, app, area),
    AppMode::Detail => render_detail(frame, app, area),
    AppMode::Confirm | AppMode::Input | AppMode::Results => {
      if app.results.is_some() {
        render_results(frame, app, area);
      } else {
        render_welcome(frame, app, area);
      }
    }
  }
}

fn render_welcome(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let body = if app.catalog.is_empty() {
    "No catalog loaded yet. Press ^r to fetch one."
  } else {
    "Type to search modes by name, slug or group. Tab narrows by category."
  };
  let text = vec![
    Line::from(""),
    Line::from(Span::styled("◆  Roo mode finder", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))),
    Line::from(""),
    Line::from(Span::styled(format!("{} modes in the catalog.", app.catalog.len()), Style::default().fg(theme.fg))),
    Line::from(""),
    Line::from(Span::styled(body, Style::default().fg(theme.muted))),
  ];
  let paragraph = Paragraph::new(text)
    .alignment(Alignment::Center)
    .block(Block::bordered().border_type(BorderType::Rounded).border_style(Style::default().fg(theme.border)));
  frame.render_widget(paragraph, area);
}

fn render_results(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();

  // Inner width: area minus 2 borders minus 2 chars for highlight symbol ("▶ ")
  let inner_w = area.width.saturating_sub(4) as usize;
  let selected = app.list_state.selected();

  let items: Vec<ListItem> = app
    .visible()
    .iter()
    .enumerate()
    .filter_map(|(row, &idx)| app.catalog.custom_modes.get(idx).map(|record| (row, record)))
    .map(|(row, record)| {
      let is_selected = Some(row) == selected;
      let fg = if is_selected { theme.highlight_fg } else { theme.fg };
      let bg = if is_selected {
        theme.highlight_bg
      } else if row % 2 == 1 {
        theme.stripe_bg
      } else {
        theme.bg
      };

      let mark = if app.marked.contains(&record.slug) { "● " } else { "  " };
      let category = Category::of(&record.slug).label();
      let right = format!("{}  {}", record.slug, category);
      let (name, gap) = name_cell(mark, record.plain_name(), &right, inner_w);

      let line = Line::from(vec![
        Span::styled(mark, Style::default().fg(theme.success)),
        Span::styled(name, Style::default().fg(fg)),
        Span::raw(" ".repeat(gap)),
        Span::styled(record.slug.clone(), Style::default().fg(theme.muted)),
        Span::raw("  "),
        Span::styled(category, Style::default().fg(theme.accent)),
      ]);
      ListItem::new(line).bg(bg)
    })
    .collect();

  let title = if items.is_empty() {
    format!(" No matches · {} ", app.filter.label())
  } else {
    let marked = if app.marked.is_empty() { String::new() } else { format!(" · {} marked", app.marked.len()) };
    format!(" {} results · {}{} ", items.len(), app.filter.label(), marked)
  };

  let list = List::new(items)
    .block(panel(theme, title))
    .highlight_symbol("▶ ")
    .highlight_style(Style::default().fg(theme.highlight_fg).bg(theme.highlight_bg).add_modifier(Modifier::BOLD));

  frame.render_stateful_widget(list, area, &mut app.list_state);
}

fn detail_lines<'a>(record: &'a ModeRecord, theme: &Theme, marked: bool) -> Vec<Line<'a>> {
  let label = |s: &'static str| Span::styled(s, Style::default().fg(theme.muted));
  let groups: Vec<&str> = record.groups.iter().map(|g| g.tag()).collect();
  let mut lines = vec![
    Line::from(Span::styled(record.name.as_str(), Style::default().fg(theme.fg).add_modifier(Modifier::BOLD))),
    Line::from(""),
    Line::from(vec![label("Slug      "), Span::styled(record.slug.as_str(), Style::default().fg(theme.accent))]),
    Line::from(vec![label("Category  "), Span::styled(Category::of(&record.slug).label(), Style::default().fg(theme.fg))]),
    Line::from(vec![
      label("Groups    "),
      Span::styled(if groups.is_empty() { "none".to_string() } else { groups.join(", ") }, Style::default().fg(theme.fg)),
    ]),
  ];
  if marked {
    lines.push(Line::from(Span::styled("● marked for export", Style::default().fg(theme.success))));
  }
  lines.push(Line::from(""));
  lines.push(Line::from(label("Summary")));
  for text in summarize_role(&record.role_definition).lines() {
    lines.push(Line::from(Span::styled(text.to_string(), Style::default().fg(theme.fg))));
  }
  lines.push(Line::from(""));
  lines.push(Line::from(label("Role definition")));
  for text in display_role(&record.role_definition).lines() {
    lines.push(Line::from(Span::styled(text.to_string(), Style::default().fg(theme.fg))));
  }
  lines
}

fn render_detail(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let block = panel(theme, " Mode ").padding(Padding::horizontal(1));
  let Some(record) = app.selected_record() else {
    frame.render_widget(block, area);
    return;
  };
  let lines = detail_lines(record, theme, app.marked.contains(&record.slug));
  let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false }).scroll((app.detail_scroll, 0)).block(block);
  frame.render_widget(paragraph, area);
}

fn severity_color(theme: &Theme, severity: Severity) -> ratatui::style::Color {
  match severity {
    Severity::Info => theme.fg,
    Severity::Success => theme.success,
    Severity::Warning => theme.status,
    Severity::Error => theme.error,
  }
}

fn render_logs(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let entries = app.logs.entries();
  let title = format!(" Developer log · {} entries ", entries.len());
  let lines: Vec<Line> = entries
    .iter()
    .rev()
    .map(|entry| {
      Line::from(vec![
        Span::styled(entry.timestamp.format("%H:%M:%S ").to_string(), Style::default().fg(theme.muted)),
        Span::styled(format!("{:<8}", entry.severity.label()), Style::default().fg(severity_color(theme, entry.severity))),
        Span::styled(entry.message.clone(), Style::default().fg(theme.fg)),
      ])
    })
    .collect();
  let paragraph = Paragraph::new(lines)
    .wrap(Wrap { trim: false })
    .scroll((app.log_scroll, 0))
    .block(panel(theme, title).padding(Padding::horizontal(1)));
  frame.render_widget(paragraph, area);
}

fn render_confirm(frame: &mut Frame, app: &App) {
  let Some(prompt) = &app.confirm else { return };
  let theme = app.theme();
  let [area] = Layout::horizontal([Constraint::Percentage(60)]).flex(Flex::Center).areas(frame.area());
  let [area] = Layout::vertical([Constraint::Length(7)]).flex(Flex::Center).areas(area);

  let lines = vec![
    Line::from(Span::styled(prompt.message.as_str(), Style::default().fg(theme.fg))),
    Line::from(""),
    Line::from(vec![
      Span::styled(" y ", Style::default().fg(theme.key_fg).bg(theme.key_bg)),
      Span::styled(" Yes   ", Style::default().fg(theme.muted)),
      Span::styled(" n ", Style::default().fg(theme.key_fg).bg(theme.key_bg)),
      Span::styled(" No ", Style::default().fg(theme.muted)),
    ]),
  ];
  let block = Block::bordered()
    .title(format!(" {} ", prompt.title))
    .title_style(Style::default().fg(theme.error).add_modifier(Modifier::BOLD))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(theme.error))
    .padding(Padding::horizontal(1))
    .style(Style::default().bg(theme.bg));
  frame.render_widget(Clear, area);
  frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }).block(block), area);
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let (text, style) = if let Some(msg) = &app.status_message {
    (format!(" ⏳ {}", msg), Style::default().fg(theme.status))
  } else if let Some(notice) = &app.notice {
    match notice.kind {
      NoticeKind::Error => (format!(" ⚠  {}", notice.text), Style::default().fg(theme.error)),
      NoticeKind::Success => (format!(" ✓ {}", notice.text), Style::default().fg(theme.success)),
      NoticeKind::Info => (format!(" ℹ {}", notice.text), Style::default().fg(theme.fg)),
    }
  } else {
    (" Ready".to_string(), Style::default().fg(theme.muted))
  };
  frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_input(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let border_color = if app.mode == AppMode::Input { theme.accent } else { theme.border };
  let input_block = Block::bordered()
    .title(format!(" Search modes · {} ", app.filter.label()))
    .title_style(Style::default().fg(border_color))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(border_color))
    .padding(Padding::horizontal(1));

  let inner_w = area.width.saturating_sub(4) as usize;
  let cursor_col = display_width(&app.input, app.cursor_position);

  if cursor_col < app.input_scroll {
    app.input_scroll = cursor_col;
  } else if cursor_col >= app.input_scroll + inner_w {
    app.input_scroll = cursor_col.saturating_sub(inner_w) + 1;
  }

  let visible: String = app
    .input
    .chars()
    .scan(0usize, |col, c| {
      let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
      let start = *col;
      *col += w;
      Some((start, *col, c))
    })
    .skip_while(|(_, end, _)| *end <= app.input_scroll)
    .take_while(|(start, _, _)| *start < app.input_scroll + inner_w)
    .map(|(_, _, c)| c)
    .collect();

  let paragraph = Paragraph::new(visible).style(Style::default().fg(theme.fg)).block(input_block);
  frame.render_widget(paragraph, area);

  if app.mode == AppMode::Input {
    let cursor_x = area.x + 2 + (cursor_col - app.input_scroll) as u16;
    frame.set_cursor_position((cursor_x, area.y + 1));
  }
}

fn footer_keys(app: &App) -> Vec<(&'static str, &'static str)> {
  match app.mode {
    AppMode::Input => {
      let mut k = vec![("Tab", "Category"), ("^r", "Refresh"), ("^f", "Force"), ("^l", "Log"), ("^t", "Theme")];
      if !app.marked.is_empty() {
        k.push(("^e", "Export"));
      }
      if app.visible().is_empty() {
        k.push(("Esc", "Quit"));
      } else {
        k.push(("↓", "Results"));
      }
      k
    }
    AppMode::Results => vec![
      ("Enter", "Details"),
      ("j/k", "Navigate"),
      ("Space", "Mark"),
      ("a", "Mark all"),
      ("^e", "Export"),
      ("^y", "Copy slug"),
      ("Esc", "Search"),
    ],
    AppMode::Detail => vec![("j/k", "Scroll"), ("Space", "Mark"), ("^y", "Copy slug"), ("Esc", "Back")],
    AppMode::Logs => vec![("j/k", "Scroll"), ("c", "Clear logs"), ("x", "Clear cache"), ("d", "Export data"), ("Esc", "Back")],
    AppMode::Confirm => vec![("y", "Yes"), ("n", "No")],
  }
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let keys = footer_keys(app);

  let spans: Vec<Span> = keys
    .iter()
    .enumerate()
    .flat_map(|(i, (key, action))| {
      let mut s = vec![
        Span::styled(format!(" {} ", key), Style::default().fg(theme.key_fg).bg(theme.key_bg)),
        Span::styled(format!(" {} ", action), Style::default().fg(theme.muted)),
      ];
      if i < keys.len() - 1 {
        s.push(Span::raw("  "));
      }
      s
    })
    .collect();

  frame.render_widget(Line::from(spans), area);

  let theme_label = format!("{} ", theme.name);
  let right = Line::from(Span::styled(&theme_label, Style::default().fg(theme.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(theme_label.len() as u16), width: theme_label.len() as u16, ..area };
  frame.render_widget(right, right_area);
}
