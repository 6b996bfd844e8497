//! Content catalog
//!
//! The catalog is the ingestion boundary: raw entries (from a file or built
//! in code) are validated and turned into immutable [`ContentItem`]s with a
//! resolved [`Category`], show key and episode order. Nothing past this
//! module deals with category spellings or id conventions.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use ktv_common::{Category, Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Position of an episode within its show
///
/// Numeric orders sort before labels; labels compare digit-aware
/// (`ep2 < ep10`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EpisodeOrder {
    Number(u32),
    Label(String),
}

impl Ord for EpisodeOrder {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (EpisodeOrder::Number(a), EpisodeOrder::Number(b)) => a.cmp(b),
            (EpisodeOrder::Number(_), EpisodeOrder::Label(_)) => Ordering::Less,
            (EpisodeOrder::Label(_), EpisodeOrder::Number(_)) => Ordering::Greater,
            (EpisodeOrder::Label(a), EpisodeOrder::Label(b)) => natural_cmp(a, b),
        }
    }
}

impl PartialOrd for EpisodeOrder {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for EpisodeOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EpisodeOrder::Number(n) => write!(f, "#{}", n),
            EpisodeOrder::Label(label) => f.write_str(label),
        }
    }
}

/// Split into alternating digit / non-digit runs
fn runs(s: &str) -> Vec<(bool, &str)> {
    let bytes = s.as_bytes();
    let mut out = Vec::new();
    let mut start = 0;
    for i in 1..=bytes.len() {
        if i == bytes.len() || bytes[i].is_ascii_digit() != bytes[start].is_ascii_digit() {
            out.push((bytes[start].is_ascii_digit(), &s[start..i]));
            start = i;
        }
    }
    out
}

/// Digit-aware string comparison
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    for (left, right) in runs(a).into_iter().zip(runs(b)) {
        let ordering = match (left, right) {
            ((true, x), (true, y)) => {
                let xt = x.trim_start_matches('0');
                let yt = y.trim_start_matches('0');
                xt.len().cmp(&yt.len()).then_with(|| xt.cmp(yt))
            }
            ((true, _), (false, _)) => Ordering::Less,
            ((false, _), (true, _)) => Ordering::Greater,
            ((false, x), (false, y)) => x.cmp(y),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    // Same natural value: fall back to a total order on the raw text
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Show key derived from an id of the form `<prefix>-<digits>`
///
/// ```
/// use ktv_pd::catalog::derive_show_key;
///
/// assert_eq!(derive_show_key("bluey-001"), "bluey");
/// assert_eq!(derive_show_key("os-vegetais-12"), "os-vegetais");
/// assert_eq!(derive_show_key("filme-especial"), "filme-especial");
/// ```
pub fn derive_show_key(id: &str) -> String {
    match id.rsplit_once('-') {
        Some((prefix, suffix))
            if !prefix.is_empty() && !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) =>
        {
            prefix.to_string()
        }
        _ => id.to_string(),
    }
}

/// Episode order derived from the trailing digits of an id
pub fn derive_episode_order(id: &str) -> EpisodeOrder {
    let digits = id.len() - id.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 {
        if let Ok(n) = id[id.len() - digits..].parse::<u32>() {
            return EpisodeOrder::Number(n);
        }
    }
    EpisodeOrder::Label(id.to_string())
}

/// One playable asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub category: Category,
    pub duration_seconds: u32,
    pub show_key: String,
    pub episode_order: EpisodeOrder,
}

impl ContentItem {
    /// Build an item, deriving show key and episode order from the id
    pub fn new(id: impl Into<String>, category: Category, duration_seconds: u32) -> Self {
        let id = id.into();
        Self {
            show_key: derive_show_key(&id),
            episode_order: derive_episode_order(&id),
            id,
            title: None,
            category,
            duration_seconds,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_show(mut self, show_key: impl Into<String>) -> Self {
        self.show_key = show_key.into();
        self
    }

    pub fn with_episode_order(mut self, order: EpisodeOrder) -> Self {
        self.episode_order = order;
        self
    }

    pub fn duration_minutes(&self) -> f64 {
        f64::from(self.duration_seconds) / 60.0
    }
}

/// Read-only source of content items
pub trait ContentCatalog: Send + Sync {
    /// Current snapshot of the catalog
    fn list_content(&self) -> Result<Vec<ContentItem>>;
}

/// In-memory catalog
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    items: Vec<ContentItem>,
}

impl StaticCatalog {
    pub fn new(items: Vec<ContentItem>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl ContentCatalog for StaticCatalog {
    fn list_content(&self) -> Result<Vec<ContentItem>> {
        Ok(self.items.clone())
    }
}

/// Raw catalog entry as written in catalog files
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub category: String,
    pub duration_seconds: u32,
    /// Explicit show key, overrides the one derived from the id
    #[serde(default)]
    pub show: Option<String>,
    /// Explicit episode number, overrides the one derived from the id
    #[serde(default)]
    pub episode: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TomlCatalogFile {
    #[serde(default, rename = "item")]
    items: Vec<CatalogEntry>,
}

/// Validate raw entries and resolve them into content items
///
/// Rejects unknown categories, zero durations and duplicate ids.
pub fn ingest(entries: Vec<CatalogEntry>) -> Result<Vec<ContentItem>> {
    let mut seen = HashSet::new();
    let mut items = Vec::with_capacity(entries.len());

    for entry in entries {
        let id = entry.id.trim().to_string();
        if id.is_empty() {
            return Err(Error::InvalidInput("Catalog entry with empty id".to_string()));
        }
        if !seen.insert(id.clone()) {
            return Err(Error::InvalidInput(format!("Duplicate content id: {}", id)));
        }
        if entry.duration_seconds == 0 {
            return Err(Error::InvalidInput(format!(
                "Content {} has zero duration",
                id
            )));
        }
        let category: Category = entry.category.parse()?;

        let mut item = ContentItem::new(id, category, entry.duration_seconds);
        if let Some(title) = entry.title {
            item = item.with_title(title);
        }
        if let Some(show) = entry.show {
            item = item.with_show(show);
        }
        if let Some(episode) = entry.episode {
            item = item.with_episode_order(EpisodeOrder::Number(episode));
        }
        items.push(item);
    }

    Ok(items)
}

/// Catalog backed by a file, re-read on every snapshot
///
/// `.json` files hold an array of entries; anything else is parsed as TOML
/// with one `[[item]]` table per entry.
#[derive(Debug, Clone)]
pub struct FileCatalog {
    path: PathBuf,
}

impl FileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse a catalog document without touching the filesystem
    pub fn parse(text: &str, json: bool) -> Result<Vec<ContentItem>> {
        let entries: Vec<CatalogEntry> = if json {
            serde_json::from_str(text)?
        } else {
            toml::from_str::<TomlCatalogFile>(text)?.items
        };
        ingest(entries)
    }
}

impl ContentCatalog for FileCatalog {
    fn list_content(&self) -> Result<Vec<ContentItem>> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::NotFound(format!("Catalog {}: {}", self.path.display(), e))
        })?;
        let json = self
            .path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let items = Self::parse(&text, json)?;
        debug!("Read {} items from {}", items.len(), self.path.display());
        Ok(items)
    }
}

/// Log a one-line census of a catalog snapshot
pub fn log_census(items: &[ContentItem]) {
    let count = |c: Category| items.iter().filter(|i| i.category == c).count();
    let shows: HashSet<&str> = items
        .iter()
        .filter(|i| i.category == Category::Cartoon)
        .map(|i| i.show_key.as_str())
        .collect();
    info!(
        "Catalog: {} items ({} cartoons in {} shows, {} educational, {} commercials, {} movies)",
        items.len(),
        count(Category::Cartoon),
        shows.len(),
        count(Category::EducationalClip),
        count(Category::Commercial),
        count(Category::Movie)
    );
}
