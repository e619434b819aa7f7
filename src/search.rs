//! Free-text search and slug-derived categories.

use clap::ValueEnum;

use crate::catalog::{Catalog, ModeRecord};

/// Category derived from a slug prefix. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Category {
  Design,
  Dev,
  Framework,
  Data,
  Infra,
  Management,
  Agent,
  Specialist,
  Other,
}

/// Prefix rules, evaluated in order. First match wins.
const PREFIX_RULES: &[(&[&str], Category)] = &[
  (&["design-"], Category::Design),
  (&["dev-"], Category::Dev),
  (&["framework-"], Category::Framework),
  (&["data-"], Category::Data),
  (&["infra-", "auth-", "cloud-", "edge-", "baas-"], Category::Infra),
  (&["manager-", "lead-"], Category::Management),
  (&["agent-"], Category::Agent),
  (&["spec-", "test-", "cms-"], Category::Specialist),
];

const MANAGEMENT_SLUGS: &[&str] = &["roo-commander", "core-architect"];

impl Category {
  pub const ALL: [Category; 9] = [
    Category::Design,
    Category::Dev,
    Category::Framework,
    Category::Data,
    Category::Infra,
    Category::Management,
    Category::Agent,
    Category::Specialist,
    Category::Other,
  ];

  pub fn of(slug: &str) -> Self {
    PREFIX_RULES
      .iter()
      .find(|(prefixes, _)| prefixes.iter().any(|p| slug.starts_with(p)))
      .map(|(_, category)| *category)
      .unwrap_or_else(|| if MANAGEMENT_SLUGS.contains(&slug) { Category::Management } else { Category::Other })
  }

  pub fn label(self) -> &'static str {
    match self {
      Category::Design => "design",
      Category::Dev => "dev",
      Category::Framework => "framework",
      Category::Data => "data",
      Category::Infra => "infra",
      Category::Management => "management",
      Category::Agent => "agent",
      Category::Specialist => "specialist",
      Category::Other => "other",
    }
  }
}

/// Category restriction for a search. `All` bypasses category filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CategoryFilter {
  #[default]
  All,
  Only(Category),
}

impl CategoryFilter {
  pub fn label(self) -> &'static str {
    match self {
      CategoryFilter::All => "all",
      CategoryFilter::Only(c) => c.label(),
    }
  }

  /// Next filter in the cycle All → design → … → other → All.
  pub fn next(self) -> Self {
    match self {
      CategoryFilter::All => CategoryFilter::Only(Category::ALL[0]),
      CategoryFilter::Only(c) => {
        let idx = Category::ALL.iter().position(|x| *x == c).unwrap_or(0);
        Category::ALL.get(idx + 1).map_or(CategoryFilter::All, |n| CategoryFilter::Only(*n))
      }
    }
  }

  fn admits(self, record: &ModeRecord) -> bool {
    match self {
      CategoryFilter::All => true,
      CategoryFilter::Only(c) => Category::of(&record.slug) == c,
    }
  }
}

impl From<Option<Category>> for CategoryFilter {
  fn from(c: Option<Category>) -> Self {
    c.map_or(CategoryFilter::All, CategoryFilter::Only)
  }
}

/// Result of a search.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome<'a> {
  /// Nothing has been asked yet (empty query, no category).
  NoQuery,
  /// Matching records in catalog order. May be empty.
  Matches(Vec<&'a ModeRecord>),
}

impl<'a> SearchOutcome<'a> {
  pub fn records(&self) -> &[&'a ModeRecord] {
    match self {
      SearchOutcome::NoQuery => &[],
      SearchOutcome::Matches(records) => records,
    }
  }
}

/// Case-insensitive substring match on name, slug and group tags.
pub fn matches_query(record: &ModeRecord, needle: &str) -> bool {
  if needle.is_empty() {
    return true;
  }
  record.name.to_lowercase().contains(needle)
    || record.slug.to_lowercase().contains(needle)
    || record.groups.iter().any(|g| g.tag().to_lowercase().contains(needle))
}

pub fn search<'a>(catalog: &'a Catalog, query: &str, filter: CategoryFilter) -> SearchOutcome<'a> {
  let needle = query.trim().to_lowercase();
  if needle.is_empty() && filter == CategoryFilter::All {
    return SearchOutcome::NoQuery;
  }
  SearchOutcome::Matches(
    catalog.custom_modes.iter().filter(|m| filter.admits(m) && matches_query(m, &needle)).collect(),
  )
}
