//! External documentation URLs for targets outside the build, such as
//! framework types documented on learn.microsoft.com.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::Error;
use crate::storage::SqliteStorage;

/// Unversioned url: locale, endpoint.
const URL_FORMAT: &str = "https://learn.microsoft.com/{locale}/library/{endpoint}";

/// Versioned url: locale, endpoint, version.
const URL_FORMAT_VERSION: &str = "https://learn.microsoft.com/{locale}/library/{endpoint}(v={version})";

/// Default locale segment.
pub const DEFAULT_LOCALE: &str = "en-us";

/// Version pinned for ids under a given namespace prefix.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VersionOverride {
    /// Namespace prefix, compared case-insensitively after the `X:` tag.
    pub prefix: String,
    /// Version used instead of the global one.
    pub version: String,
}

/// Url formatting settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalSettings {
    /// When false every lookup returns `None`.
    pub enabled: bool,
    /// Locale path segment.
    pub locale: String,
    /// Per-prefix version pins, first match wins.
    pub overrides: Vec<VersionOverride>,
    /// Global version; empty means unversioned urls.
    pub version: String,
}

impl Default for ExternalSettings {
    fn default() -> Self {
        return Self {
            enabled: true,
            locale: DEFAULT_LOCALE.to_string(),
            overrides: Vec::new(),
            version: String::new(),
        };
    }
}

/// Where endpoint slugs come from.
pub enum Endpoints {
    /// Nothing configured; every lookup misses.
    Absent,
    /// In-memory map loaded from a JSON file.
    Map(HashMap<String, String>),
    /// Endpoint table of a persisted target store.
    Store(Arc<SqliteStorage>),
}

impl std::fmt::Debug for Endpoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return match self {
            Self::Absent => f.write_str("Absent"),
            Self::Map(map) => write!(f, "Map({} endpoints)", map.len()),
            Self::Store(_) => f.write_str("Store"),
        };
    }
}

impl Endpoints {
    /// Load a JSON object mapping target ids to endpoint slugs.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read or `Error::Json` if it
    /// is not a string-to-string object.
    pub fn from_json_file(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        let map: HashMap<String, String> = serde_json::from_str(&content)?;
        debug!(path = %path.display(), endpoints = map.len(), "loaded external endpoints");
        return Ok(Self::Map(map));
    }

    /// Endpoint slug for one id.
    fn get(&self, id: &str) -> Option<String> {
        return match self {
            Self::Absent => None,
            Self::Map(map) => map.get(id).cloned(),
            Self::Store(store) => store.endpoint(id).unwrap_or_else(|e| {
                warn!(id, error = %e, "endpoint lookup failed");
                return None;
            }),
        };
    }
}

/// Maps target ids to external urls, caching each answer.
#[derive(Debug)]
pub struct ExternalUrlResolver {
    /// Id → url, `None` caching a miss.
    cache: Mutex<HashMap<String, Option<String>>>,
    /// Backing endpoint data.
    endpoints: Endpoints,
    /// Formatting settings.
    settings: ExternalSettings,
}

impl ExternalUrlResolver {
    /// A resolver over the given endpoints.
    pub fn new(settings: ExternalSettings, endpoints: Endpoints) -> Self {
        return Self {
            cache: Mutex::new(HashMap::new()),
            endpoints,
            settings,
        };
    }

    /// A resolver that never produces a url.
    pub fn disabled() -> Self {
        return Self::new(
            ExternalSettings {
                enabled: false,
                ..ExternalSettings::default()
            },
            Endpoints::Absent,
        );
    }

    /// Whether lookups can ever succeed.
    pub fn is_enabled(&self) -> bool {
        return self.settings.enabled && !matches!(self.endpoints, Endpoints::Absent);
    }

    /// External url for `id`, or `None` when disabled or unknown.
    pub fn url(&self, id: &str) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }
        if let Some(cached) = self.cache.lock().unwrap_or_else(PoisonError::into_inner).get(id) {
            return cached.clone();
        }
        let url = self
            .endpoints
            .get(id)
            .filter(|e| return !e.is_empty())
            .map(|endpoint| return self.format(id, &endpoint));
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), url.clone());
        return url;
    }

    /// Apply the url format, choosing the version for `id`.
    fn format(&self, id: &str, endpoint: &str) -> String {
        let name = id.split_once(':').map_or(id, |(_, rest)| return rest).to_ascii_lowercase();
        let version = self
            .settings
            .overrides
            .iter()
            .find(|o| return name.starts_with(&o.prefix.to_ascii_lowercase()))
            .map_or(self.settings.version.as_str(), |o| return o.version.as_str());
        let template = if version.is_empty() { URL_FORMAT } else { URL_FORMAT_VERSION };
        return template
            .replace("{locale}", &self.settings.locale)
            .replace("{endpoint}", endpoint)
            .replace("{version}", version);
    }
}

/// Copy a JSON endpoint map into a store's endpoint table.
///
/// # Errors
///
/// Returns read, parse, or store write failures.
pub fn import_endpoints(store: &SqliteStorage, path: &Path) -> Result<usize, Error> {
    let Endpoints::Map(map) = Endpoints::from_json_file(path)? else {
        return Ok(0);
    };
    store.insert_endpoints(map.iter().map(|(id, endpoint)| return (id.as_str(), endpoint.as_str())))?;
    return Ok(map.len());
}
