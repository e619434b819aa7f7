use ratatui::style::Color;

/// Terminal color palette. `name` is what gets persisted in prefs.
pub struct Theme {
  pub name: &'static str,
  pub bg: Color,
  pub fg: Color,
  pub accent: Color,
  pub muted: Color,
  pub border: Color,
  pub highlight_fg: Color,
  pub highlight_bg: Color,
  pub stripe_bg: Color,
  pub status: Color,
  pub success: Color,
  pub error: Color,
  pub key_fg: Color,
  pub key_bg: Color,
}

pub const THEMES: [Theme; 2] = [
  Theme {
    name: "dark",
    bg: Color::Rgb(24, 26, 33),
    fg: Color::Rgb(220, 223, 228),
    accent: Color::Rgb(97, 175, 239),
    muted: Color::Rgb(118, 124, 138),
    border: Color::Rgb(62, 68, 81),
    highlight_fg: Color::Rgb(24, 26, 33),
    highlight_bg: Color::Rgb(97, 175, 239),
    stripe_bg: Color::Rgb(30, 33, 41),
    status: Color::Rgb(229, 192, 123),
    success: Color::Rgb(152, 195, 121),
    error: Color::Rgb(224, 108, 117),
    key_fg: Color::Rgb(24, 26, 33),
    key_bg: Color::Rgb(118, 124, 138),
  },
  Theme {
    name: "light",
    bg: Color::Rgb(250, 250, 250),
    fg: Color::Rgb(56, 58, 66),
    accent: Color::Rgb(64, 120, 242),
    muted: Color::Rgb(140, 143, 152),
    border: Color::Rgb(208, 210, 216),
    highlight_fg: Color::Rgb(250, 250, 250),
    highlight_bg: Color::Rgb(64, 120, 242),
    stripe_bg: Color::Rgb(240, 241, 243),
    status: Color::Rgb(193, 132, 1),
    success: Color::Rgb(80, 161, 79),
    error: Color::Rgb(228, 86, 73),
    key_fg: Color::Rgb(250, 250, 250),
    key_bg: Color::Rgb(140, 143, 152),
  },
];

/// Index of the theme called `name`, falling back to the first.
pub fn theme_index(name: Option<&str>) -> usize {
  name.and_then(|n| THEMES.iter().position(|t| t.name.eq_ignore_ascii_case(n))).unwrap_or(0)
}
