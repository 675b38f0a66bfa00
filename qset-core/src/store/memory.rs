//! In-memory document store

use super::executor::PipelineExecutor;
use super::pipeline::Stage;
use super::{DocumentStore, StoreError};
use crate::document::Document;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Named collections of documents held in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    executed: AtomicU64,
    executor: PipelineExecutor,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append documents to a collection, creating it if needed
    pub fn insert_many(&self, collection: &str, docs: impl IntoIterator<Item = Document>) {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .extend(docs);
    }

    pub fn insert(&self, collection: &str, doc: Document) {
        self.insert_many(collection, std::iter::once(doc));
    }

    /// Drop a collection, returning its documents
    pub fn drop_collection(&self, collection: &str) -> Option<Vec<Document>> {
        self.collections.write().remove(collection)
    }

    /// Collection names, sorted
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Number of pipelines executed so far
    pub fn executions(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    /// Load every `<collection>.json` file in a directory. Each file holds a
    /// JSON array of documents in extended JSON.
    pub fn load_dir(&self, dir: impl AsRef<Path>) -> Result<usize, StoreError> {
        let dir = dir.as_ref();
        let mut loaded = 0;

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let Some(collection) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let docs = Self::read_fixture(&path)?;
            debug!(collection, documents = docs.len(), "loaded fixture");
            self.insert_many(collection, docs);
            loaded += 1;
        }

        info!(dir = %dir.display(), collections = loaded, "loaded document fixtures");
        Ok(loaded)
    }

    fn read_fixture(path: &Path) -> Result<Vec<Document>, StoreError> {
        let invalid = |reason: String| StoreError::InvalidFixture {
            path: path.display().to_string(),
            reason,
        };

        let content = fs::read_to_string(path)?;
        let json: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?;

        let items = json
            .as_array()
            .ok_or_else(|| invalid("expected an array of documents".to_string()))?;

        items
            .iter()
            .map(|item| Document::from_json_value(item).map_err(|e| invalid(e.to_string())))
            .collect()
    }
}

impl DocumentStore for MemoryStore {
    fn execute(&self, collection: &str, pipeline: &[Document]) -> Result<Vec<Document>, StoreError> {
        let stages = Stage::parse_pipeline(pipeline)?;
        self.executed.fetch_add(1, Ordering::Relaxed);

        // Unknown collections are empty
        let documents = self
            .collections
            .read()
            .get(collection)
            .cloned()
            .unwrap_or_default();

        let results = self.executor.execute(documents, &stages);
        debug!(
            collection,
            stages = stages.len(),
            returned = results.len(),
            "executed pipeline"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(json: serde_json::Value) -> Document {
        Document::from_json_value(&json).unwrap()
    }

    fn people() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_many(
            "people",
            vec![
                doc(json!({"name": "Bill", "age": 45, "tags": ["admin"]})),
                doc(json!({"name": "Jill", "age": 31})),
                doc(json!({"name": "Nate", "age": 19})),
            ],
        );
        store
    }

    #[test]
    fn test_execute_pipeline() {
        let store = people();
        let pipeline = vec![
            doc(json!({"$match": {"age": {"$gte": 21}}})),
            doc(json!({"$sort": {"age": 1}})),
            doc(json!({"$project": {"name": 1}})),
        ];

        let results = store.execute("people", &pipeline).unwrap();
        assert_eq!(
            results,
            vec![doc(json!({"name": "Jill"})), doc(json!({"name": "Bill"}))]
        );
        assert_eq!(store.executions(), 1);
    }

    #[test]
    fn test_unknown_collection_is_empty() {
        let store = people();
        let results = store.execute("nobody", &[doc(json!({"$match": {}}))]).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_invalid_pipeline_is_rejected() {
        let store = people();
        let err = store
            .execute("people", &[doc(json!({"$lookup": {}}))])
            .unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedStage(_)));
        assert_eq!(store.executions(), 0);
    }

    #[test]
    fn test_store_does_not_modify_collection() {
        let store = people();
        store
            .execute("people", &[doc(json!({"$limit": 1}))])
            .unwrap();
        assert_eq!(store.count("people"), 3);
    }

    #[test]
    fn test_load_dir() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("stations.json"),
            r#"[{"_id": {"$oid": "5660bc6e16908cae692e0593"}, "station_id": "42021"}]"#,
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = MemoryStore::new();
        assert_eq!(store.load_dir(dir.path()).unwrap(), 1);
        assert_eq!(store.collection_names(), vec!["stations".to_string()]);

        let results = store.execute("stations", &[]).unwrap();
        assert!(results[0].get("_id").unwrap().as_object_id().is_some());
    }

    #[test]
    fn test_load_dir_invalid_fixture() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bad.json"), r#"{"not": "an array"}"#).unwrap();

        let err = MemoryStore::new().load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidFixture { .. }));
    }
}
