//! Target index: loads reflection sources into storage once per build and
//! serves immutable id → target snapshots.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use tracing::{debug, error, info};
use walkdir::WalkDir;

use crate::cer::TargetLookup;
use crate::error::Error;
use crate::hasher::{SourceFingerprint, fingerprint_files};
use crate::reflection::ReflectionReader;
use crate::storage::{MemoryStorage, SqliteStorage, StorageBackend};
use crate::types::{LinkKind, Target};

/// Meta key under which the persisted store records its source fingerprint.
const FINGERPRINT_KEY: &str = "source-fingerprint";

/// Directory marker identifying framework reflection data.
const SYSTEM_MARKER: &str = "data/reflection";

/// File name of a prebuilt store inside an auxiliary data-source directory.
const DATA_SOURCE_STORE: &str = "targets.db";

/// One registered group of reflection files.
#[derive(Debug, Clone, Default)]
pub struct TargetSource {
    /// Directory the file pattern is relative to.
    pub base: PathBuf,
    /// Auxiliary data-source directory, if the source declares one.
    pub data_source: Option<PathBuf>,
    /// Link kind declared for every target in this source.
    pub link_kind: LinkKind,
    /// File glob, optionally with leading directories (`sub/*.xml`).
    pub pattern: String,
    /// Whether to descend into subdirectories.
    pub recurse: bool,
    /// Explicit system classification; wins over every heuristic.
    pub system: Option<bool>,
}

/// Storage settings shared by every load of one index.
#[derive(Debug, Clone, Default)]
pub struct IndexSettings {
    /// Additional read-only stores merged after the primary.
    pub merge: Vec<PathBuf>,
    /// Reader used for every reflection file.
    pub reader: ReflectionReader,
    /// Primary persisted store; `None` keeps system targets in memory.
    pub store: Option<PathBuf>,
}

/// Immutable view over the loaded targets.
#[derive(Clone)]
pub struct TargetCollection {
    /// Fallback kind for persisted records that declare none.
    local_default: Option<LinkKind>,
    /// Kind attached as `external_link_kind` to every system target.
    external_default: Option<LinkKind>,
    /// Targets from non-system sources.
    local: Arc<dyn StorageBackend>,
    /// The persisted store, when one was opened.
    persisted: Option<Arc<SqliteStorage>>,
    /// Targets from system sources (the persisted store or its memory stand-in).
    system: Arc<dyn StorageBackend>,
}

impl std::fmt::Debug for TargetCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return f
            .debug_struct("TargetCollection")
            .field("local", &self.local.len())
            .field("system", &self.system.len())
            .field("local_default", &self.local_default)
            .field("external_default", &self.external_default)
            .finish_non_exhaustive();
    }
}

impl TargetCollection {
    /// A collection holding only the given local targets.
    pub fn from_targets(targets: Vec<Target>) -> Self {
        let mut local = MemoryStorage::new();
        for target in targets {
            if let Err(e) = local.insert(target) {
                error!(error = %e, "cannot insert target");
            }
        }
        return Self {
            local_default: None,
            external_default: None,
            local: Arc::new(local),
            persisted: None,
            system: Arc::new(MemoryStorage::new()),
        };
    }

    /// Look up a target. Local sources shadow system sources.
    pub fn get(&self, id: &str) -> Option<Arc<Target>> {
        if let Some(target) = self.local.get(id) {
            return Some(target);
        }
        let target = self.system.get(id)?;
        let fill_default = target.default_link_kind == LinkKind::None && self.local_default.is_some();
        if self.external_default.is_none() && !fill_default {
            return Some(target);
        }
        let mut served = (*target).clone();
        if fill_default && let Some(kind) = self.local_default {
            served.default_link_kind = kind;
        }
        served.external_link_kind = self.external_default;
        return Some(Arc::new(served));
    }

    /// Whether the id is known.
    pub fn contains(&self, id: &str) -> bool {
        return self.get(id).is_some();
    }

    /// First non-external kind declared by a non-system source.
    pub fn local_default(&self) -> Option<LinkKind> {
        return self.local_default;
    }

    /// First kind declared by a system source.
    pub fn external_default(&self) -> Option<LinkKind> {
        return self.external_default;
    }

    /// The persisted store, for endpoint lookups.
    pub fn persisted(&self) -> Option<&Arc<SqliteStorage>> {
        return self.persisted.as_ref();
    }

    /// Number of distinct ids served. A local id shadowing a system id
    /// counts once.
    pub fn len(&self) -> usize {
        let system_only = self.system.ids().iter().filter(|id| return self.local.get(id).is_none()).count();
        return self.local.len().saturating_add(system_only);
    }

    /// Whether no targets were loaded.
    pub fn is_empty(&self) -> bool {
        return self.len() == 0;
    }
}

impl TargetLookup for TargetCollection {
    fn lookup(&self, id: &str) -> Option<Arc<Target>> {
        return self.get(id);
    }
}

/// Loads sources exactly once and hands out the resulting snapshot.
#[derive(Debug, Default)]
pub struct TargetIndex {
    /// Storage and reader configuration.
    settings: IndexSettings,
    /// Load latch; set by the first `load`.
    snapshot: OnceLock<TargetCollection>,
}

impl TargetIndex {
    /// An index that has not loaded anything yet.
    pub fn new(settings: IndexSettings) -> Self {
        return Self {
            settings,
            snapshot: OnceLock::new(),
        };
    }

    /// Load `sources` on the first call; later calls return the existing
    /// snapshot and ignore their arguments.
    pub fn load(&self, sources: &[TargetSource]) -> TargetCollection {
        return self
            .snapshot
            .get_or_init(|| return Loader::new(&self.settings).run(sources))
            .clone();
    }

    /// The snapshot, if `load` has run.
    pub fn snapshot(&self) -> Option<&TargetCollection> {
        return self.snapshot.get();
    }
}

// ── Loading ───────────────────────────────────────────────────────────

/// A source whose directory exists, after classification.
struct ResolvedSource {
    /// Directory to scan.
    directory: PathBuf,
    /// Link kind for its targets.
    link_kind: LinkKind,
    /// Compiled file-name pattern.
    pattern: glob::Pattern,
    /// Whether to recurse.
    recurse: bool,
}

/// One-shot state for building a collection.
struct Loader<'a> {
    /// Fallback for system targets when no store is available.
    fallback: MemoryStorage,
    /// Non-system targets.
    local: MemoryStorage,
    /// Primary persisted store, if it opened.
    persisted: Option<SqliteStorage>,
    /// Configuration.
    settings: &'a IndexSettings,
}

impl<'a> Loader<'a> {
    /// Open the persisted store (falling back to memory on failure).
    fn new(settings: &'a IndexSettings) -> Self {
        let persisted = settings.store.as_deref().and_then(|path| {
            return match SqliteStorage::open(path) {
                Ok(mut store) => {
                    for extra in &settings.merge {
                        if let Err(e) = store.merge(extra) {
                            error!(path = %extra.display(), error = %e, "cannot merge target store");
                        }
                    }
                    Some(store)
                },
                Err(e) => {
                    error!(error = %e, "cannot open target store, keeping system targets in memory");
                    None
                },
            };
        });
        return Self {
            fallback: MemoryStorage::new(),
            local: MemoryStorage::new(),
            persisted,
            settings,
        };
    }

    /// Classify and load every source, then freeze the result.
    fn run(mut self, sources: &[TargetSource]) -> TargetCollection {
        let mut local_default = None;
        let mut external_default = None;
        let mut persisted_sources = Vec::new();

        for source in sources {
            let Some(resolved) = resolve_source(source) else {
                continue;
            };
            let system = self.classify(source, &resolved.directory);
            if system {
                external_default.get_or_insert(source.link_kind);
            } else if source.link_kind != LinkKind::External {
                local_default.get_or_insert(source.link_kind);
            }

            if system || source.link_kind == LinkKind::External {
                persisted_sources.push(resolved);
            } else {
                for file in matching_files(&resolved) {
                    load_file(&self.settings.reader, &mut self.local, &file, resolved.link_kind);
                }
            }
        }

        self.load_persisted(&persisted_sources);

        let persisted = self.persisted.map(Arc::new);
        let system: Arc<dyn StorageBackend> = match &persisted {
            Some(store) => Arc::clone(store) as Arc<dyn StorageBackend>,
            None => Arc::new(self.fallback),
        };
        let collection = TargetCollection {
            local_default,
            external_default,
            local: Arc::new(self.local),
            persisted,
            system,
        };
        info!(
            local = collection.local.len(),
            system = collection.system.len(),
            "loaded reference targets"
        );
        return collection;
    }

    /// System classification: explicit flag, then data source, then path marker.
    fn classify(&mut self, source: &TargetSource, directory: &Path) -> bool {
        if let Some(system) = source.system {
            return system;
        }
        if let Some(data) = source.data_source.as_deref().filter(|d| return d.is_dir()) {
            let prebuilt = data.join(DATA_SOURCE_STORE);
            if prebuilt.is_file()
                && let Some(store) = self.persisted.as_mut()
                && let Err(e) = store.merge(&prebuilt)
            {
                error!(path = %prebuilt.display(), error = %e, "cannot merge data source store");
            }
            return true;
        }
        return is_system_path(directory);
    }

    /// Populate the persisted role, skipping the parse when the store is fresh.
    fn load_persisted(&mut self, sources: &[ResolvedSource]) {
        if sources.is_empty() {
            return;
        }
        let files: Vec<(PathBuf, LinkKind)> = sources
            .iter()
            .flat_map(|s| return matching_files(s).into_iter().map(|f| return (f, s.link_kind)))
            .collect();

        let Some(store) = self.persisted.as_mut() else {
            for (file, kind) in &files {
                load_file(&self.settings.reader, &mut self.fallback, file, *kind);
            }
            return;
        };

        let paths: Vec<PathBuf> = files.iter().map(|(f, _)| return f.clone()).collect();
        let SourceFingerprint(fingerprint) = fingerprint_files(&paths);
        let recorded = store.meta(FINGERPRINT_KEY).unwrap_or_else(|e| {
            error!(error = %e, "cannot read target store fingerprint");
            return None;
        });
        if store.exists() && recorded.as_deref() == Some(fingerprint.as_str()) {
            debug!(targets = store.len(), "target store is fresh");
            return;
        }
        if recorded.is_some()
            && let Err(e) = store.clear()
        {
            error!(error = %e, "cannot clear stale target store");
        }
        for (file, kind) in &files {
            load_file(&self.settings.reader, store, file, *kind);
        }
        if let Err(e) = store.set_meta(FINGERPRINT_KEY, &fingerprint) {
            error!(error = %e, "cannot record target store fingerprint");
        }
    }
}

/// Check a source's configuration and directory; log and drop bad ones.
fn resolve_source(source: &TargetSource) -> Option<ResolvedSource> {
    if source.pattern.trim().is_empty() {
        error!(base = %source.base.display(), "a targets source must name the files to load");
        return None;
    }
    let full = source.base.join(&source.pattern);
    let directory = full
        .parent()
        .filter(|p| return !p.as_os_str().is_empty())
        .map_or_else(|| return PathBuf::from("."), Path::to_path_buf);
    let file_pattern = full.file_name().map(|n| return n.to_string_lossy().into_owned()).unwrap_or_default();
    let pattern = match glob::Pattern::new(&file_pattern) {
        Ok(p) => p,
        Err(e) => {
            error!(pattern = %file_pattern, error = %e, "invalid targets file pattern");
            return None;
        },
    };
    if !directory.is_dir() {
        error!(directory = %directory.display(), "the targets directory does not exist");
        return None;
    }
    return Some(ResolvedSource {
        directory,
        link_kind: source.link_kind,
        pattern,
        recurse: source.recurse,
    });
}

/// Whether a directory path carries the system reflection marker.
pub fn is_system_path(directory: &Path) -> bool {
    let normalized = directory.to_string_lossy().replace('\\', "/").to_lowercase();
    return normalized.contains(SYSTEM_MARKER);
}

/// Files in the source directory whose names match its pattern, sorted.
fn matching_files(source: &ResolvedSource) -> Vec<PathBuf> {
    let depth = if source.recurse { usize::MAX } else { 1 };
    let mut files: Vec<PathBuf> = WalkDir::new(&source.directory)
        .max_depth(depth)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| return e.file_type().is_file())
        .filter(|e| return source.pattern.matches(&e.file_name().to_string_lossy()))
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    return files;
}

/// Parse one file into `storage`, logging and skipping it on failure.
fn load_file(reader: &ReflectionReader, storage: &mut dyn StorageBackend, file: &Path, kind: LinkKind) {
    let result = reader.read_file(file, kind).and_then(|targets| {
        let count = targets.len();
        storage.insert_all(targets)?;
        return Ok::<_, Error>(count);
    });
    match result {
        Ok(count) => debug!(file = %file.display(), count, "loaded target file"),
        Err(e) => error!(file = %file.display(), error = %e, "skipping target file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reflection(ids: &[(&str, &str)]) -> String {
        let apis: String = ids
            .iter()
            .map(|(id, file)| {
                format!(
                    r#"<api id="{id}"><apidata name="{file}" group="type" subgroup="class"/><containers><library assembly="Lib"/></containers><file name="{file}"/></api>"#
                )
            })
            .collect();
        return format!("<reflection><apis>{apis}</apis></reflection>");
    }

    fn local_source(dir: &Path) -> TargetSource {
        return TargetSource {
            base: dir.to_path_buf(),
            link_kind: LinkKind::Local,
            pattern: "*.xml".to_string(),
            ..TargetSource::default()
        };
    }

    #[test]
    fn load_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.xml"), reflection(&[("T:A", "a"), ("T:B", "b")])).unwrap();
        let index = TargetIndex::default();
        let sources = [local_source(dir.path())];

        let first = index.load(&sources);
        let second = index.load(&sources);
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert_eq!(first.get("T:A"), second.get("T:A"));
    }

    #[test]
    fn duplicate_ids_resolve_to_one_target() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.xml"), reflection(&[("T:A", "first")])).unwrap();
        std::fs::write(dir.path().join("b.xml"), reflection(&[("T:A", "second")])).unwrap();
        let collection = TargetIndex::default().load(&[local_source(dir.path())]);
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.get("T:A").unwrap().file, "second");
    }

    #[test]
    fn bad_files_and_missing_directories_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.xml"), "<reflection><apis>").unwrap();
        std::fs::write(dir.path().join("good.xml"), reflection(&[("T:Good", "good")])).unwrap();
        let missing = TargetSource {
            base: dir.path().join("nope"),
            ..local_source(dir.path())
        };
        let collection = TargetIndex::default().load(&[missing, local_source(dir.path())]);
        assert!(collection.contains("T:Good"));
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn recurse_controls_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/n.xml"), reflection(&[("T:N", "n")])).unwrap();

        let flat = TargetIndex::default().load(&[local_source(dir.path())]);
        assert!(!flat.contains("T:N"));

        let deep = TargetIndex::default().load(&[TargetSource {
            recurse: true,
            ..local_source(dir.path())
        }]);
        assert!(deep.contains("T:N"));
    }

    #[test]
    fn system_targets_carry_the_external_default() {
        let dir = tempfile::tempdir().unwrap();
        let system_dir = dir.path().join("Data").join("Reflection");
        std::fs::create_dir_all(&system_dir).unwrap();
        std::fs::write(system_dir.join("fw.xml"), reflection(&[("T:System.String", "s")])).unwrap();
        std::fs::write(dir.path().join("lib.xml"), reflection(&[("T:Lib.Widget", "w")])).unwrap();

        let sources = [
            TargetSource {
                base: system_dir,
                link_kind: LinkKind::External,
                pattern: "*.xml".to_string(),
                ..TargetSource::default()
            },
            TargetSource {
                link_kind: LinkKind::LocalOrIndex,
                ..local_source(dir.path())
            },
        ];
        let collection = TargetIndex::default().load(&sources);
        assert_eq!(collection.external_default(), Some(LinkKind::External));
        assert_eq!(collection.local_default(), Some(LinkKind::LocalOrIndex));

        let string = collection.get("T:System.String").unwrap();
        assert_eq!(string.external_link_kind, Some(LinkKind::External));
        let widget = collection.get("T:Lib.Widget").unwrap();
        assert_eq!(widget.external_link_kind, None);
        assert_eq!(widget.base_link_kind(), LinkKind::LocalOrIndex);
    }

    #[test]
    fn explicit_flag_beats_path_marker() {
        let dir = tempfile::tempdir().unwrap();
        let system_dir = dir.path().join("data/reflection");
        std::fs::create_dir_all(&system_dir).unwrap();
        std::fs::write(system_dir.join("fw.xml"), reflection(&[("T:X", "x")])).unwrap();
        let collection = TargetIndex::default().load(&[TargetSource {
            system: Some(false),
            ..local_source(&system_dir)
        }]);
        assert_eq!(collection.external_default(), None);
        assert_eq!(collection.get("T:X").unwrap().external_link_kind, None);
    }

    #[test]
    fn system_path_marker_is_case_and_separator_insensitive() {
        assert!(is_system_path(Path::new(r"C:\Sandcastle\DATA\Reflection\dotnet")));
        assert!(is_system_path(Path::new("/opt/sandcastle/data/reflection")));
        assert!(!is_system_path(Path::new("/home/me/reflection")));
    }

    #[test]
    fn data_source_marks_system_and_merges_its_prebuilt_store() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("descriptor");
        std::fs::create_dir(&data).unwrap();
        {
            let mut prebuilt = SqliteStorage::open(&data.join(DATA_SOURCE_STORE)).unwrap();
            prebuilt
                .insert(Target {
                    file: "pre".to_string(),
                    id: "T:Pre.Built".to_string(),
                    ..Target::default()
                })
                .unwrap();
        }
        let plain = dir.path().join("framework");
        std::fs::create_dir(&plain).unwrap();
        std::fs::write(plain.join("fw.xml"), reflection(&[("T:System.Int32", "i")])).unwrap();

        let settings = IndexSettings {
            store: Some(dir.path().join("store/targets.db")),
            ..IndexSettings::default()
        };
        let collection = TargetIndex::new(settings).load(&[TargetSource {
            base: plain,
            data_source: Some(data),
            link_kind: LinkKind::External,
            pattern: "*.xml".to_string(),
            ..TargetSource::default()
        }]);
        assert!(!is_system_path(Path::new("framework")));
        assert_eq!(collection.external_default(), Some(LinkKind::External));
        assert_eq!(collection.get("T:Pre.Built").unwrap().file, "pre");
        assert_eq!(collection.get("T:System.Int32").unwrap().external_link_kind, Some(LinkKind::External));
    }

    #[test]
    fn unopenable_store_keeps_system_targets_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let data = dir.path().join("fw");
        std::fs::create_dir(&data).unwrap();
        std::fs::write(data.join("fw.xml"), reflection(&[("T:System.String", "s")])).unwrap();

        let settings = IndexSettings {
            store: Some(blocker.join("targets.db")),
            ..IndexSettings::default()
        };
        let collection = TargetIndex::new(settings).load(&[TargetSource {
            base: data,
            link_kind: LinkKind::External,
            pattern: "*.xml".to_string(),
            system: Some(true),
            ..TargetSource::default()
        }]);
        assert!(collection.persisted().is_none());
        assert_eq!(collection.get("T:System.String").unwrap().file, "s");
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn local_ids_shadowing_system_ids_count_once() {
        let dir = tempfile::tempdir().unwrap();
        let system_dir = dir.path().join("data/reflection");
        std::fs::create_dir_all(&system_dir).unwrap();
        std::fs::write(system_dir.join("fw.xml"), reflection(&[("T:Shared", "sys"), ("T:Sys.Only", "o")])).unwrap();
        std::fs::write(dir.path().join("lib.xml"), reflection(&[("T:Shared", "lib")])).unwrap();

        let collection = TargetIndex::default().load(&[
            TargetSource {
                base: system_dir,
                link_kind: LinkKind::External,
                pattern: "*.xml".to_string(),
                ..TargetSource::default()
            },
            local_source(dir.path()),
        ]);
        assert_eq!(collection.get("T:Shared").unwrap().file, "lib");
        assert_eq!(collection.len(), 2);
    }

    #[test]
    fn persisted_store_is_reused_while_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("fw");
        std::fs::create_dir(&data).unwrap();
        std::fs::write(data.join("fw.xml"), reflection(&[("T:System.Int32", "i")])).unwrap();
        let settings = IndexSettings {
            store: Some(dir.path().join("store/targets.db")),
            ..IndexSettings::default()
        };
        let source = TargetSource {
            base: data.clone(),
            link_kind: LinkKind::External,
            pattern: "*.xml".to_string(),
            system: Some(true),
            ..TargetSource::default()
        };

        let first = TargetIndex::new(settings.clone()).load(std::slice::from_ref(&source));
        assert!(first.persisted().is_some());
        assert!(first.contains("T:System.Int32"));
        drop(first);

        // A fresh index over an unchanged source serves the stored records.
        let second = TargetIndex::new(settings.clone()).load(std::slice::from_ref(&source));
        assert_eq!(second.get("T:System.Int32").unwrap().file, "i");
        drop(second);

        // Changing the source invalidates the fingerprint and repopulates.
        std::fs::write(data.join("fw.xml"), reflection(&[("T:System.Int64", "long-file")])).unwrap();
        let third = TargetIndex::new(settings).load(&[source]);
        assert!(third.contains("T:System.Int64"));
        assert!(!third.contains("T:System.Int32"));
    }
}
