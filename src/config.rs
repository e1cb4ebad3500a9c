use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, error};

use crate::conceptual::{DEFAULT_CAPACITY, TargetDirectory};
use crate::context::{BuilderKind, ExternalConfig, ResolverContext};
use crate::error::Error;
use crate::external::{DEFAULT_LOCALE, ExternalSettings, VersionOverride};
use crate::index::{IndexSettings, TargetSource};
use crate::query::NodePath;
use crate::reflection::ReflectionReader;
use crate::resolver::{ConceptualOptions, ReferenceOptions};
use crate::types::{ConceptualLinkKind, LinkKind};

/// Configuration file looked up when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "reflink.toml";

/// Resolved project configuration. Relative paths in the file are taken
/// relative to the file's directory.
#[derive(Debug, Clone)]
pub struct Config {
    /// Conceptual topic settings.
    pub conceptual: ConceptualConfig,
    /// External url settings.
    pub external: ExternalConfig,
    /// Storage and reader settings for the target index.
    pub index: IndexSettings,
    /// Reference link rendering options.
    pub reference: ReferenceOptions,
    /// Registered reflection sources, in file order.
    pub sources: Vec<TargetSource>,
}

/// Conceptual topic directories and rendering options.
#[derive(Debug, Clone)]
pub struct ConceptualConfig {
    /// Which shared cache the directories are registered in.
    pub builder: BuilderKind,
    /// Bound of each conceptual cache.
    pub capacity: usize,
    /// Topic directories, in lookup order.
    pub directories: Vec<TargetDirectory>,
    /// Rendering options.
    pub options: ConceptualOptions,
}

// ── Raw TOML layout ──────────────────────────────────────────────────

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawConfig {
    conceptual: RawConceptual,
    external: RawExternal,
    reference: RawReference,
    storage: RawStorage,
    targets: Vec<RawTargets>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawStorage {
    merge: Vec<PathBuf>,
    path: Option<PathBuf>,
}

#[derive(Deserialize)]
struct RawTargets {
    base: PathBuf,
    data_source: Option<PathBuf>,
    #[serde(default = "default_files")]
    files: String,
    #[serde(default)]
    recurse: bool,
    system: Option<bool>,
    #[serde(rename = "type", default = "default_link_kind")]
    link_kind: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawReference {
    base_url: Option<String>,
    container: Option<String>,
    href_format: Option<String>,
    id_uri_format: Option<String>,
    link_target: Option<String>,
}

#[derive(Deserialize)]
#[serde(default)]
struct RawExternal {
    enabled: bool,
    endpoints: Option<PathBuf>,
    locale: String,
    version: String,
    version_overrides: Vec<VersionOverride>,
}

impl Default for RawExternal {
    fn default() -> Self {
        return Self {
            enabled: true,
            endpoints: None,
            locale: DEFAULT_LOCALE.to_string(),
            version: String::new(),
            version_overrides: Vec::new(),
        };
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct RawConceptual {
    builder: String,
    cache_capacity: usize,
    show_broken_link_text: bool,
    show_text: bool,
    targets: Vec<RawConceptualTargets>,
    #[serde(rename = "type")]
    link_kind: Option<String>,
}

impl Default for RawConceptual {
    fn default() -> Self {
        return Self {
            builder: "conceptual".to_string(),
            cache_capacity: DEFAULT_CAPACITY,
            show_broken_link_text: false,
            show_text: false,
            targets: Vec::new(),
            link_kind: None,
        };
    }
}

#[derive(Deserialize)]
struct RawConceptualTargets {
    base: PathBuf,
    text: Option<String>,
    #[serde(rename = "type", default = "default_conceptual_kind")]
    link_kind: String,
    url: Option<String>,
}

fn default_files() -> String {
    return "*.xml".to_string();
}

fn default_link_kind() -> String {
    return "localorindex".to_string();
}

fn default_conceptual_kind() -> String {
    return "local".to_string();
}

// ── Loading ──────────────────────────────────────────────────────────

impl Config {
    /// Load configuration from `path`.
    /// Returns defaults (no sources, no directories) if the file doesn't exist.
    /// A file that exists but is malformed is an error, never a silent default.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if reading fails (other than not-found),
    /// `Error::TomlDe` if the TOML is malformed, or `Error::InvalidConfig`
    /// for an unknown builder kind.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let root = path.parent().unwrap_or_else(|| return Path::new("."));
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no configuration file, using defaults");
                return Self::from_toml("", root);
            },
            Err(e) => return Err(Error::Io(e)),
        };
        return Self::from_toml(&content, root);
    }

    /// Build configuration from TOML text, resolving relative paths against
    /// `root`. Invalid sources and directories are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns `Error::TomlDe` for malformed TOML or `Error::InvalidConfig`
    /// for an unknown builder kind.
    pub fn from_toml(content: &str, root: &Path) -> Result<Self, Error> {
        let raw: RawConfig = toml::from_str(content)?;
        let join = |p: &Path| return root.join(p);

        let reader = match raw.reference.container.as_deref().map(NodePath::parse) {
            None => ReflectionReader::default(),
            Some(Ok(path)) => ReflectionReader::new(path),
            Some(Err(e)) => {
                error!(error = %e, "ignoring reference.container, using the default");
                ReflectionReader::default()
            },
        };

        let sources = raw
            .targets
            .into_iter()
            .filter_map(|unit| match unit.link_kind.parse::<LinkKind>() {
                Ok(link_kind) => {
                    return Some(TargetSource {
                        base: join(&unit.base),
                        data_source: unit.data_source.as_deref().map(join),
                        link_kind,
                        pattern: unit.files,
                        recurse: unit.recurse,
                        system: unit.system,
                    });
                },
                Err(e) => {
                    error!(base = %unit.base.display(), error = %e, "skipping target source");
                    return None;
                },
            })
            .collect();

        let defaults = ReferenceOptions::default();
        let reference = ReferenceOptions {
            base_url: raw.reference.base_url,
            href_format: raw.reference.href_format.unwrap_or(defaults.href_format),
            id_uri_format: raw.reference.id_uri_format.unwrap_or(defaults.id_uri_format),
            link_target: raw.reference.link_target.unwrap_or(defaults.link_target),
        };

        let external = ExternalConfig {
            endpoints: raw.external.endpoints.as_deref().map(join),
            settings: ExternalSettings {
                enabled: raw.external.enabled,
                locale: raw.external.locale,
                overrides: raw.external.version_overrides,
                version: raw.external.version,
            },
        };

        return Ok(Self {
            conceptual: conceptual_config(raw.conceptual, root)?,
            external,
            index: IndexSettings {
                merge: raw.storage.merge.iter().map(|p| return join(p)).collect(),
                reader,
                store: raw.storage.path.as_deref().map(join),
            },
            reference,
            sources,
        });
    }

    /// A resolver context with the conceptual directories registered.
    pub fn context(&self) -> ResolverContext {
        let context = ResolverContext::new(self.index.clone(), self.external.clone(), self.conceptual.capacity);
        let cache = context.conceptual_cache(self.conceptual.builder);
        for directory in &self.conceptual.directories {
            if !cache.register_directory(directory.clone()) {
                debug!(path = %directory.path.display(), "conceptual directory already registered");
            }
        }
        return context;
    }
}

/// Validate the conceptual section, skipping unusable directories.
fn conceptual_config(raw: RawConceptual, root: &Path) -> Result<ConceptualConfig, Error> {
    let builder = raw.builder.parse::<BuilderKind>()?;
    let base_kind = raw.link_kind.as_deref().and_then(|value| match value.parse::<ConceptualLinkKind>() {
        Ok(kind) => return Some(kind),
        Err(e) => {
            error!(error = %e, "ignoring conceptual.type");
            return None;
        },
    });

    let directories = raw
        .targets
        .into_iter()
        .filter_map(|unit| {
            let directory = unit
                .link_kind
                .parse::<ConceptualLinkKind>()
                .map(|kind| return TargetDirectory::new(root.join(&unit.base), kind))
                .and_then(|d| return d.with_rules(unit.url.as_deref(), unit.text.as_deref()));
            return match directory {
                Ok(directory) => Some(directory),
                Err(e) => {
                    error!(base = %unit.base.display(), error = %e, "skipping conceptual target directory");
                    None
                },
            };
        })
        .collect();

    return Ok(ConceptualConfig {
        builder,
        capacity: raw.cache_capacity,
        directories,
        options: ConceptualOptions {
            base_kind,
            show_broken_link_text: raw.show_broken_link_text,
            show_text: raw.show_text,
        },
    });
}
