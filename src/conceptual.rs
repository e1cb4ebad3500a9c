//! Conceptual topic lookup: ordered metadata directories plus a bounded
//! cache from topic GUID to url, text, and link kind.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, PoisonError, RwLock};

use regex::Regex;
use tracing::{debug, error};

use crate::error::Error;
use crate::query::{DEFAULT_TEXT_EXPRESSION, DEFAULT_URL_EXPRESSION, Expression};
use crate::types::{ConceptualLinkKind, ConceptualTarget};

/// Default number of cached lookups before the cache is reset.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Canonical GUID shape; anything else is never looked up.
#[allow(clippy::expect_used, reason = "constant pattern")]
static GUID: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("valid guid regex");
});

/// Whether `id` has the canonical GUID shape.
pub fn is_valid_id(id: &str) -> bool {
    return GUID.is_match(id);
}

/// Split `id#fragment` at the first `#` after position 0.
/// A leading `#` is part of the id.
pub fn split_anchor(target: &str) -> (&str, Option<&str>) {
    return match target.get(1..).and_then(|rest| return rest.find('#')) {
        Some(offset) => {
            let at = offset.saturating_add(1);
            (target.get(..at).unwrap_or(target), target.get(at..))
        },
        None => (target, None),
    };
}

/// Append a fragment to a url when it carries more than the bare `#`.
pub fn append_anchor(url: &str, anchor: Option<&str>) -> String {
    return match anchor {
        Some(fragment) if fragment.len() > 1 => format!("{url}{fragment}"),
        _ => url.to_string(),
    };
}

/// One directory of `{id}.cmp.xml` metadata files and its extraction rules.
#[derive(Debug, Clone)]
pub struct TargetDirectory {
    /// Link kind for topics found here.
    pub kind: ConceptualLinkKind,
    /// Directory holding the metadata files.
    pub path: PathBuf,
    /// Rule producing the display text.
    pub text: Expression,
    /// Rule producing the url.
    pub url: Expression,
}

impl TargetDirectory {
    /// A directory using the default url and text rules.
    ///
    /// # Panics
    ///
    /// Panics if a built-in url or text expression fails to parse.
    #[allow(clippy::expect_used, reason = "constant expressions")]
    pub fn new(path: impl Into<PathBuf>, kind: ConceptualLinkKind) -> Self {
        let compile = |expr: &str| {
            return Expression::parse(expr).expect("valid default expression");
        };
        return Self {
            kind,
            path: path.into(),
            text: compile(DEFAULT_TEXT_EXPRESSION),
            url: compile(DEFAULT_URL_EXPRESSION),
        };
    }

    /// Override the url and text rules.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidExpression` if either rule does not compile.
    pub fn with_rules(mut self, url: Option<&str>, text: Option<&str>) -> Result<Self, Error> {
        if let Some(url) = url {
            self.url = Expression::parse(url)?;
        }
        if let Some(text) = text {
            self.text = Expression::parse(text)?;
        }
        return Ok(self);
    }

    /// Read `{id}.cmp.xml` from this directory, if present.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` or `Error::Xml` for an unreadable or malformed file.
    fn read(&self, id: &str, key: &str) -> Result<Option<ConceptualTarget>, Error> {
        let Some(file) = [id, key]
            .iter()
            .map(|name| return self.path.join(format!("{name}.cmp.xml")))
            .find(|p| return p.is_file())
        else {
            return Ok(None);
        };
        let content = std::fs::read_to_string(&file)?;
        let doc = roxmltree::Document::parse(&content).map_err(|source| {
            return Error::Xml {
                file: file.clone(),
                source,
            };
        })?;
        return Ok(Some(ConceptualTarget {
            id: key.to_string(),
            kind: self.kind,
            text: self.text.evaluate(&doc),
            url: self.url.evaluate(&doc),
        }));
    }
}

/// Outcome of a conceptual lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConceptualLookup {
    /// The topic exists.
    Found(Arc<ConceptualTarget>),
    /// The id is not GUID-shaped.
    Invalid,
    /// Well-formed id with no metadata file in any directory.
    Unknown,
}

/// Directory-ordered conceptual lookup with a clear-all bounded cache.
#[derive(Debug)]
pub struct ConceptualTargetCache {
    /// Entries allowed before the cache is reset.
    capacity: usize,
    /// Registered directories, first registered first tried.
    directories: RwLock<Vec<TargetDirectory>>,
    /// Lowercase id → target, `None` caching a permanent miss.
    entries: Mutex<HashMap<String, Option<Arc<ConceptualTarget>>>>,
}

impl Default for ConceptualTargetCache {
    fn default() -> Self {
        return Self::new(DEFAULT_CAPACITY);
    }
}

impl ConceptualTargetCache {
    /// An empty cache; a zero capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        return Self {
            capacity: capacity.max(1),
            directories: RwLock::new(Vec::new()),
            entries: Mutex::new(HashMap::new()),
        };
    }

    /// Append a lookup directory. Returns `false` for an empty path or a
    /// directory that is already registered (trailing separators ignored).
    pub fn register_directory(&self, directory: TargetDirectory) -> bool {
        let key = normalize_dir(&directory.path);
        if key.is_empty() {
            error!("a conceptual targets directory must have a base path");
            return false;
        }
        let mut directories = self.directories.write().unwrap_or_else(PoisonError::into_inner);
        if directories.iter().any(|d| return normalize_dir(&d.path) == key) {
            debug!(directory = %key, "conceptual directory already registered");
            return false;
        }
        directories.push(directory);
        return true;
    }

    /// Number of registered directories.
    pub fn directory_count(&self) -> usize {
        return self.directories.read().unwrap_or_else(PoisonError::into_inner).len();
    }

    /// Number of cached entries, misses included.
    pub fn len(&self) -> usize {
        return self.entries.lock().unwrap_or_else(PoisonError::into_inner).len();
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        return self.len() == 0;
    }

    /// Resolve a bare topic id (no fragment).
    pub fn resolve(&self, id: &str) -> ConceptualLookup {
        if !is_valid_id(id) {
            return ConceptualLookup::Invalid;
        }
        let key = id.to_ascii_lowercase();
        if let Some(cached) = self.entries.lock().unwrap_or_else(PoisonError::into_inner).get(&key) {
            return found_or_unknown(cached.clone());
        }

        let found = self.scan(id, &key).map(Arc::new);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= self.capacity {
            debug!(capacity = self.capacity, "conceptual cache full, resetting");
            entries.clear();
        }
        entries.insert(key, found.clone());
        return found_or_unknown(found);
    }

    /// Search the directories in registration order.
    fn scan(&self, id: &str, key: &str) -> Option<ConceptualTarget> {
        let directories = self.directories.read().unwrap_or_else(PoisonError::into_inner);
        for directory in directories.iter() {
            match directory.read(id, key) {
                Ok(Some(target)) => return Some(target),
                Ok(None) => {},
                Err(e) => error!(directory = %directory.path.display(), error = %e, "skipping conceptual metadata"),
            }
        }
        return None;
    }
}

/// Map a cache slot onto a lookup outcome.
fn found_or_unknown(slot: Option<Arc<ConceptualTarget>>) -> ConceptualLookup {
    return slot.map_or(ConceptualLookup::Unknown, ConceptualLookup::Found);
}

/// Directory identity used for duplicate detection.
fn normalize_dir(path: &Path) -> String {
    let text = path.to_string_lossy();
    let trimmed = text.trim_end_matches(['/', '\\']);
    if trimmed.is_empty() && !text.is_empty() {
        return "/".to_string();
    }
    return trimmed.to_string();
}
