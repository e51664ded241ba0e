//! Recorded database versions.
//!
//! The planner reads the last applied version of every batch once per run;
//! the executor writes a new version after each successful step or batch.

use crate::error::{MigrationError, Result};
use crate::migration::Version;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Last applied version per batch. A missing batch has never been migrated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseModel {
    versions: BTreeMap<String, Version>,
}

impl DatabaseModel {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded version of a batch.
    pub fn get(&self, batch: &str) -> Option<&Version> {
        self.versions.get(batch)
    }

    /// Set the recorded version of a batch.
    pub fn set(&mut self, batch: impl Into<String>, version: Version) {
        self.versions.insert(batch.into(), version);
    }

    /// Iterate batches and versions in batch order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Version)> {
        self.versions.iter().map(|(b, v)| (b.as_str(), v))
    }

    /// Number of batches with a recorded version.
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Whether no batch has a recorded version.
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

impl FromIterator<(String, Version)> for DatabaseModel {
    fn from_iter<T: IntoIterator<Item = (String, Version)>>(iter: T) -> Self {
        Self {
            versions: iter.into_iter().collect(),
        }
    }
}

/// Reads and records the last applied version per batch.
pub trait VersionStore {
    /// Read all recorded versions.
    fn read_versions(&self) -> Result<DatabaseModel>;

    /// Record the last applied version of a batch.
    fn write_version(&self, batch: &str, version: &Version) -> Result<()>;
}

impl<S: VersionStore + ?Sized> VersionStore for &S {
    fn read_versions(&self) -> Result<DatabaseModel> {
        (**self).read_versions()
    }

    fn write_version(&self, batch: &str, version: &Version) -> Result<()> {
        (**self).write_version(batch, version)
    }
}

/// Version store persisted in a sled tree.
pub struct SledVersionStore {
    tree: sled::Tree,
}

impl SledVersionStore {
    /// Tree name for recorded versions.
    pub const TREE_NAME: &'static str = "graphtool:versions";

    /// Open or create the unscoped version store.
    pub fn open(db: &sled::Db) -> Result<Self> {
        Self::open_tree(db, Self::TREE_NAME)
    }

    /// Open or create the version store of one target database.
    ///
    /// Each scope (normally the database address) gets its own tree
    /// `graphtool:versions:<scope>`, so versions recorded for one database
    /// are never planned against another.
    pub fn open_scoped(db: &sled::Db, scope: &str) -> Result<Self> {
        Self::open_tree(db, &Self::tree_name(scope))
    }

    /// Tree name used for a scope.
    pub fn tree_name(scope: &str) -> String {
        format!("{}:{}", Self::TREE_NAME, scope)
    }

    fn open_tree(db: &sled::Db, name: &str) -> Result<Self> {
        let tree = db
            .open_tree(name)
            .map_err(|e| MigrationError::DatabaseRead(e.to_string()))?;
        Ok(Self { tree })
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.tree
            .flush()
            .map_err(|e| MigrationError::DatabaseWrite(e.to_string()))?;
        Ok(())
    }
}

impl VersionStore for SledVersionStore {
    fn read_versions(&self) -> Result<DatabaseModel> {
        let mut model = DatabaseModel::new();
        for entry in self.tree.iter() {
            let (key, value) = entry.map_err(|e| MigrationError::DatabaseRead(e.to_string()))?;
            let batch = std::str::from_utf8(&key)
                .map_err(|_| MigrationError::DatabaseRead("batch key is not UTF-8".to_string()))?;
            let version = std::str::from_utf8(&value)
                .map_err(|_| {
                    MigrationError::DatabaseRead(format!("version of batch {batch} is not UTF-8"))
                })
                .and_then(|text| {
                    Version::parse(text).map_err(|e| {
                        MigrationError::DatabaseRead(format!("batch {batch}: {e}"))
                    })
                })?;
            model.set(batch, version);
        }
        Ok(model)
    }

    fn write_version(&self, batch: &str, version: &Version) -> Result<()> {
        self.tree
            .insert(batch.as_bytes(), version.to_string().as_bytes())
            .map_err(|e| MigrationError::DatabaseWrite(e.to_string()))?;
        self.flush()?;
        tracing::debug!(batch, version = %version, "recorded version");
        Ok(())
    }
}

/// In-memory version store.
#[derive(Debug, Default)]
pub struct MemoryVersionStore {
    model: Mutex<DatabaseModel>,
    writes: Mutex<Vec<(String, Version)>>,
}

impl MemoryVersionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `model`.
    pub fn with_model(model: DatabaseModel) -> Self {
        Self {
            model: Mutex::new(model),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Every write in order.
    pub fn writes(&self) -> Vec<(String, Version)> {
        self.writes.lock().clone()
    }
}

impl VersionStore for MemoryVersionStore {
    fn read_versions(&self) -> Result<DatabaseModel> {
        Ok(self.model.lock().clone())
    }

    fn write_version(&self, batch: &str, version: &Version) -> Result<()> {
        self.model.lock().set(batch, version.clone());
        self.writes.lock().push((batch.to_string(), version.clone()));
        Ok(())
    }
}
