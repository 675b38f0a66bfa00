//! Set storage

use super::{Set, SetError};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Read access to stored sets
pub trait SetStore: Send + Sync {
    fn get_set_by_name(&self, name: &str) -> Result<Arc<Set>, SetStoreError>;

    /// Names of every stored set, sorted
    fn get_set_names(&self) -> Result<Vec<String>, SetStoreError>;
}

impl<T: SetStore + ?Sized> SetStore for Arc<T> {
    fn get_set_by_name(&self, name: &str) -> Result<Arc<Set>, SetStoreError> {
        (**self).get_set_by_name(name)
    }

    fn get_set_names(&self) -> Result<Vec<String>, SetStoreError> {
        (**self).get_set_names()
    }
}

/// Set storage errors
#[derive(Debug, thiserror::Error)]
pub enum SetStoreError {
    #[error("Set {0:?} not found")]
    NotFound(String),

    #[error("Invalid set: {0}")]
    InvalidSet(#[from] SetError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
}

/// Sets held in memory, keyed by name
#[derive(Debug)]
pub struct MemorySetStore {
    sets: RwLock<BTreeMap<String, Arc<Set>>>,
    max_queries: usize,
}

impl MemorySetStore {
    /// Store accepting sets with at most `max_queries` stages
    pub fn new(max_queries: usize) -> Self {
        Self {
            sets: RwLock::new(BTreeMap::new()),
            max_queries,
        }
    }

    /// Validate and store a set, replacing any set with the same name
    pub fn upsert(&self, set: Set) -> Result<Arc<Set>, SetStoreError> {
        set.validate(self.max_queries)?;

        let set = Arc::new(set);
        self.sets.write().insert(set.name.clone(), Arc::clone(&set));
        debug!(set = %set.name, queries = set.queries.len(), "stored set");
        Ok(set)
    }

    pub fn delete(&self, name: &str) -> Result<Arc<Set>, SetStoreError> {
        self.sets
            .write()
            .remove(name)
            .ok_or_else(|| SetStoreError::NotFound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.sets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.read().is_empty()
    }

    /// Read and validate a set from a JSON file
    pub fn read_file(path: impl AsRef<Path>) -> Result<Set, SetStoreError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        Set::from_json(&content).map_err(|source| SetStoreError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load every `*.json` file in a directory
    pub fn load_dir(&self, dir: impl AsRef<Path>) -> Result<usize, SetStoreError> {
        let dir = dir.as_ref();

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        for path in &paths {
            let set = Self::read_file(path)?;
            self.upsert(set)?;
        }

        info!(dir = %dir.display(), sets = paths.len(), "loaded query sets");
        Ok(paths.len())
    }
}

impl SetStore for MemorySetStore {
    fn get_set_by_name(&self, name: &str) -> Result<Arc<Set>, SetStoreError> {
        self.sets
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| SetStoreError::NotFound(name.to_string()))
    }

    fn get_set_names(&self) -> Result<Vec<String>, SetStoreError> {
        Ok(self.sets.read().keys().cloned().collect())
    }
}
