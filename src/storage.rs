//! Target storage backends: a transient in-memory map and a persisted SQLite
//! store that can merge several physical databases into one logical view.
//!
//! Backends hold records only. Which records go where, and what link kind a
//! record is served with, is decided by the index.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use rusqlite::{Connection, OpenFlags, OptionalExtension as _, params};
use tracing::{debug, warn};

use crate::error::Error;
use crate::types::Target;

/// Id → target storage. Written during the load phase, read-only afterwards.
pub trait StorageBackend: Send + Sync {
    /// Whether the backend already holds records from an earlier load.
    fn exists(&self) -> bool {
        return self.len() > 0;
    }

    /// Look up one target.
    fn get(&self, id: &str) -> Option<Arc<Target>>;

    /// Every stored id, each once.
    fn ids(&self) -> Vec<String>;

    /// Insert or replace one target.
    ///
    /// # Errors
    ///
    /// Returns backend-specific write failures.
    fn insert(&mut self, target: Target) -> Result<(), Error>;

    /// Insert a batch of targets parsed from one source file.
    ///
    /// # Errors
    ///
    /// Returns the first write failure.
    fn insert_all(&mut self, targets: Vec<Target>) -> Result<(), Error> {
        for target in targets {
            self.insert(target)?;
        }
        return Ok(());
    }

    /// Whether the backend holds no records.
    fn is_empty(&self) -> bool {
        return self.len() == 0;
    }

    /// Number of distinct ids stored.
    fn len(&self) -> usize;
}

// ── Memory ────────────────────────────────────────────────────────────

/// Transient storage for one build.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    /// Records keyed by id; a later insert replaces an earlier one.
    targets: HashMap<String, Arc<Target>>,
}

impl MemoryStorage {
    /// An empty store.
    pub fn new() -> Self {
        return Self::default();
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, id: &str) -> Option<Arc<Target>> {
        return self.targets.get(id).cloned();
    }

    fn ids(&self) -> Vec<String> {
        return self.targets.keys().cloned().collect();
    }

    fn insert(&mut self, target: Target) -> Result<(), Error> {
        if let Some(previous) = self.targets.insert(target.id.clone(), Arc::new(target)) {
            debug!(id = %previous.id, "replaced duplicate target");
        }
        return Ok(());
    }

    fn len(&self) -> usize {
        return self.targets.len();
    }
}

// ── SQLite ────────────────────────────────────────────────────────────

/// Schema shared by every physical store.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS targets (id TEXT PRIMARY KEY NOT NULL, record TEXT NOT NULL);
CREATE TABLE IF NOT EXISTS endpoints (id TEXT PRIMARY KEY NOT NULL, endpoint TEXT NOT NULL);
CREATE TABLE IF NOT EXISTS meta (key TEXT PRIMARY KEY NOT NULL, value TEXT NOT NULL);
";

/// One database file taking part in the merged view.
struct PhysicalStore {
    /// Open connection; `rusqlite::Connection` is not `Sync`.
    conn: Mutex<Connection>,
    /// Where the database lives, for diagnostics.
    path: PathBuf,
}

impl PhysicalStore {
    /// Run `f` with exclusive access to the connection.
    fn with<T>(&self, f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>) -> Result<T, Error> {
        let mut guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        return f(&mut *guard).map_err(|e| return Error::store(&self.path, e));
    }
}

/// Persisted key-value storage. Lookups consult each physical store in
/// merge order; the first store is the only one written to.
pub struct SqliteStorage {
    /// Decoded records, filled lazily on lookup.
    cache: Mutex<HashMap<String, Arc<Target>>>,
    /// Physical stores in merge order.
    stores: Vec<PhysicalStore>,
}

impl SqliteStorage {
    /// Open (creating if needed) the primary, writable store.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the parent directory cannot be created,
    /// or `Error::Store` if the database cannot be opened or initialized.
    pub fn open(path: &Path) -> Result<Self, Error> {
        if let Some(parent) = path.parent().filter(|p| return !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| return Error::store(path, e))?;
        conn.execute_batch(SCHEMA).map_err(|e| return Error::store(path, e))?;

        let mut storage = Self {
            cache: Mutex::new(HashMap::new()),
            stores: Vec::new(),
        };
        storage.attach(conn, path)?;
        return Ok(storage);
    }

    /// Merge another physical store into the logical view, read-only.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the database cannot be opened.
    pub fn merge(&mut self, path: &Path) -> Result<(), Error> {
        if self.stores.iter().any(|s| return s.path.as_path() == path) {
            return Ok(());
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| return Error::store(path, e))?;
        return self.attach(conn, path);
    }

    /// Append a newly opened store to the merge order.
    fn attach(&mut self, conn: Connection, path: &Path) -> Result<(), Error> {
        let store = PhysicalStore {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        };
        let rows: i64 = store.with(|c| {
            return c.query_row("SELECT COUNT(*) FROM targets", [], |row| return row.get(0));
        })?;
        debug!(path = %path.display(), rows, "attached target store");
        self.stores.push(store);
        return Ok(());
    }

    /// Read a metadata value from the primary store.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` on query failure.
    pub fn meta(&self, key: &str) -> Result<Option<String>, Error> {
        let Some(primary) = self.stores.first() else {
            return Ok(None);
        };
        return primary.with(|c| {
            return c
                .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
                    return row.get(0);
                })
                .optional();
        });
    }

    /// Write a metadata value to the primary store.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` on write failure.
    pub fn set_meta(&self, key: &str, value: &str) -> Result<(), Error> {
        let Some(primary) = self.stores.first() else {
            return Ok(());
        };
        primary.with(|c| {
            return c.execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
                params![key, value],
            );
        })?;
        return Ok(());
    }

    /// Drop every target record from the primary store.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` on write failure.
    pub fn clear(&mut self) -> Result<(), Error> {
        let Some(primary) = self.stores.first() else {
            return Ok(());
        };
        primary.with(|c| return c.execute("DELETE FROM targets", []))?;
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).clear();
        return Ok(());
    }

    /// Look up an external documentation endpoint in merge order.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` on query failure.
    pub fn endpoint(&self, id: &str) -> Result<Option<String>, Error> {
        for store in &self.stores {
            let found: Option<String> = store.with(|c| {
                return c
                    .query_row("SELECT endpoint FROM endpoints WHERE id = ?1", params![id], |row| {
                        return row.get(0);
                    })
                    .optional();
            })?;
            if found.is_some() {
                return Ok(found);
            }
        }
        return Ok(None);
    }

    /// Whether any physical store carries endpoint rows.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` on query failure.
    pub fn has_endpoints(&self) -> Result<bool, Error> {
        for store in &self.stores {
            let rows: i64 = store.with(|c| {
                return c.query_row("SELECT COUNT(*) FROM endpoints", [], |row| return row.get(0));
            })?;
            if rows > 0 {
                return Ok(true);
            }
        }
        return Ok(false);
    }

    /// Write endpoint rows into the primary store.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` on write failure.
    pub fn insert_endpoints<'a>(
        &self,
        endpoints: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<(), Error> {
        let Some(primary) = self.stores.first() else {
            return Ok(());
        };
        let rows: Vec<(&str, &str)> = endpoints.into_iter().collect();
        return primary.with(|c| {
            let tx = c.transaction()?;
            for (id, endpoint) in &rows {
                tx.execute(
                    "INSERT OR REPLACE INTO endpoints (id, endpoint) VALUES (?1, ?2)",
                    params![id, endpoint],
                )?;
            }
            return tx.commit();
        });
    }

    /// Decode one record, logging (not failing) on a corrupt row.
    fn decode(path: &Path, id: &str, record: &str) -> Option<Target> {
        return match serde_json::from_str::<Target>(record) {
            Ok(target) => Some(target),
            Err(e) => {
                warn!(path = %path.display(), id, error = %e, "corrupt target record");
                None
            },
        };
    }

    /// Query the physical stores in order, ignoring (but logging) failures.
    fn lookup(&self, id: &str) -> Option<Target> {
        for store in &self.stores {
            let row = store.with(|c| {
                return c
                    .query_row("SELECT record FROM targets WHERE id = ?1", params![id], |row| {
                        return row.get::<_, String>(0);
                    })
                    .optional();
            });
            match row {
                Ok(Some(record)) => return Self::decode(&store.path, id, &record),
                Ok(None) => {},
                Err(e) => warn!(error = %e, "target lookup failed"),
            }
        }
        return None;
    }
}

impl StorageBackend for SqliteStorage {
    fn get(&self, id: &str) -> Option<Arc<Target>> {
        if let Some(hit) = self.cache.lock().unwrap_or_else(PoisonError::into_inner).get(id) {
            return Some(Arc::clone(hit));
        }
        let target = Arc::new(self.lookup(id)?);
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), Arc::clone(&target));
        return Some(target);
    }

    fn insert(&mut self, target: Target) -> Result<(), Error> {
        return self.insert_all(vec![target]);
    }

    fn insert_all(&mut self, targets: Vec<Target>) -> Result<(), Error> {
        let Some(primary) = self.stores.first() else {
            return Ok(());
        };
        let mut rows = Vec::with_capacity(targets.len());
        for target in &targets {
            rows.push((target.id.as_str(), serde_json::to_string(target)?));
        }
        let cache = self.cache.get_mut().unwrap_or_else(PoisonError::into_inner);
        for target in &targets {
            cache.remove(&target.id);
        }
        return primary.with(|c| {
            let tx = c.transaction()?;
            for (id, record) in &rows {
                tx.execute(
                    "INSERT OR REPLACE INTO targets (id, record) VALUES (?1, ?2)",
                    params![id, record],
                )?;
            }
            return tx.commit();
        });
    }

    /// Ids across every physical store; an id present in several stores
    /// counts once.
    fn ids(&self) -> Vec<String> {
        let mut ids = HashSet::new();
        for store in &self.stores {
            let rows = store.with(|c| {
                let mut statement = c.prepare("SELECT id FROM targets")?;
                let ids = statement
                    .query_map([], |row| return row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<String>>>();
                return ids;
            });
            match rows {
                Ok(rows) => ids.extend(rows),
                Err(e) => warn!(error = %e, "cannot list target ids"),
            }
        }
        return ids.into_iter().collect();
    }

    fn len(&self) -> usize {
        return self.ids().len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LinkKind, TargetKind};

    fn target(id: &str, file: &str) -> Target {
        return Target {
            container: "Lib".to_string(),
            default_link_kind: LinkKind::Local,
            file: file.to_string(),
            id: id.to_string(),
            kind: TargetKind::Type,
            name: "Widget".to_string(),
            ..Target::default()
        };
    }

    #[test]
    fn memory_keeps_one_record_per_id() {
        let mut storage = MemoryStorage::new();
        storage.insert(target("T:A.Widget", "first")).unwrap();
        storage.insert(target("T:A.Widget", "second")).unwrap();
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.get("T:A.Widget").unwrap().file, "second");
    }

    #[test]
    fn sqlite_round_trips_records_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store/targets.db");
        {
            let mut storage = SqliteStorage::open(&path).unwrap();
            assert!(!storage.exists());
            storage.insert_all(vec![target("T:A.Widget", "w"), target("T:A.Gadget", "g")]).unwrap();
            assert_eq!(storage.len(), 2);
        }
        let reopened = SqliteStorage::open(&path).unwrap();
        assert!(reopened.exists());
        let widget = reopened.get("T:A.Widget").unwrap();
        assert_eq!(widget.file, "w");
        assert_eq!(widget.default_link_kind, LinkKind::Local);
        assert!(reopened.get("T:A.Missing").is_none());
    }

    #[test]
    fn merged_stores_are_consulted_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let extra_path = dir.path().join("extra.db");
        {
            let mut extra = SqliteStorage::open(&extra_path).unwrap();
            extra.insert_all(vec![target("T:A.Widget", "extra"), target("T:B.Only", "only")]).unwrap();
        }
        let mut primary = SqliteStorage::open(&dir.path().join("primary.db")).unwrap();
        primary.insert(target("T:A.Widget", "primary")).unwrap();
        primary.merge(&extra_path).unwrap();

        assert_eq!(primary.get("T:A.Widget").unwrap().file, "primary");
        assert_eq!(primary.get("T:B.Only").unwrap().file, "only");
        assert_eq!(primary.len(), 2);
    }

    #[test]
    fn replacing_a_record_keeps_one_id_and_serves_the_new_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = SqliteStorage::open(&dir.path().join("t.db")).unwrap();
        storage.insert(target("T:A.Widget", "old")).unwrap();
        assert_eq!(storage.get("T:A.Widget").unwrap().file, "old");
        storage.insert(target("T:A.Widget", "new")).unwrap();
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.get("T:A.Widget").unwrap().file, "new");
    }

    #[test]
    fn metadata_and_endpoints_persist() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::open(&dir.path().join("t.db")).unwrap();
        assert_eq!(storage.meta("fingerprint").unwrap(), None);
        storage.set_meta("fingerprint", "abc").unwrap();
        assert_eq!(storage.meta("fingerprint").unwrap().as_deref(), Some("abc"));

        assert!(!storage.has_endpoints().unwrap());
        storage.insert_endpoints([("T:System.String", "system.string")]).unwrap();
        assert!(storage.has_endpoints().unwrap());
        assert_eq!(storage.endpoint("T:System.String").unwrap().as_deref(), Some("system.string"));
    }
}
