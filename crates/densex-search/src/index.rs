//! Local vector index using usearch
//!
//! HNSW index with a metadata side table, so query results carry the
//! passage text without a second lookup.
//!
//! # Example
//!
//! ```ignore
//! use densex_search::{IndexConfig, LocalIndex, VectorRecord, VectorStore};
//!
//! let index = LocalIndex::open(Path::new("data/passages"), IndexConfig::new(384))?;
//! index.upsert(&[VectorRecord::new("doc#0", embedding).with_text(passage)]).await?;
//! index.persist().await?;
//! ```

use crate::error::{Error, Result};
use crate::store::{Match, Metadata, VectorRecord, VectorStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tracing::{debug, info, instrument};
use usearch::ffi::{IndexOptions, MetricKind, ScalarKind};

/// Configuration for the local index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Vector dimensions
    pub dimensions: usize,
    /// Connectivity parameter (higher = more accurate but slower)
    pub connectivity: usize,
    /// Expansion factor for add operations
    pub expansion_add: usize,
    /// Expansion factor for search operations
    pub expansion_search: usize,
    /// Initial capacity
    pub capacity: usize,
}

impl IndexConfig {
    /// Index configuration with default graph parameters
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            connectivity: 16,
            expansion_add: 128,
            expansion_search: 64,
            capacity: 1_024,
        }
    }

    fn options(&self) -> IndexOptions {
        IndexOptions {
            dimensions: self.dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: self.connectivity,
            expansion_add: self.expansion_add,
            expansion_search: self.expansion_search,
            multi: false,
        }
    }
}

#[derive(Debug, Default)]
struct Entries {
    id_to_key: HashMap<String, u64>,
    key_to_id: HashMap<u64, String>,
    metadata: HashMap<String, Metadata>,
}

/// Sidecar persisted next to the usearch file
#[derive(Debug, Serialize, Deserialize)]
struct IdMapping {
    mappings: Vec<(String, u64)>,
    next_key: u64,
    #[serde(default)]
    metadata: HashMap<String, Metadata>,
}

/// HNSW vector index with metadata
pub struct LocalIndex {
    index: usearch::Index,
    entries: RwLock<Entries>,
    next_key: AtomicU64,
    config: IndexConfig,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for LocalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalIndex")
            .field("config", &self.config)
            .field("path", &self.path)
            .field("len", &self.len())
            .finish()
    }
}

impl LocalIndex {
    /// Create an in-memory index
    pub fn new(config: IndexConfig) -> Result<Self> {
        let index = usearch::Index::new(&config.options())
            .map_err(|e| Error::Index(format!("Failed to create index: {e}")))?;
        index
            .reserve(config.capacity)
            .map_err(|e| Error::Index(format!("Failed to reserve capacity: {e}")))?;

        info!(dimensions = config.dimensions, "created local vector index");

        Ok(Self {
            index,
            entries: RwLock::new(Entries::default()),
            next_key: AtomicU64::new(1),
            config,
            path: None,
        })
    }

    /// Open the index persisted at `path`, or create an empty one that
    /// will be saved there
    pub fn open(path: &Path, config: IndexConfig) -> Result<Self> {
        let index_path = path.with_extension("usearch");
        let mapping_path = path.with_extension("mapping.json");

        let mut index = if index_path.exists() && mapping_path.exists() {
            Self::load(&index_path, &mapping_path, config)?
        } else {
            Self::new(config)?
        };
        index.path = Some(path.to_path_buf());
        Ok(index)
    }

    fn load(index_path: &Path, mapping_path: &Path, config: IndexConfig) -> Result<Self> {
        let index = usearch::Index::new(&config.options())
            .map_err(|e| Error::Index(format!("Failed to create index: {e}")))?;
        index
            .load(path_str(index_path)?)
            .map_err(|e| Error::Index(format!("Failed to load index: {e}")))?;

        let mapping: IdMapping = serde_json::from_str(&std::fs::read_to_string(mapping_path)?)
            .map_err(|e| Error::Serialization(format!("Failed to parse mapping: {e}")))?;

        let entries = Entries {
            key_to_id: mapping.mappings.iter().map(|(id, key)| (*key, id.clone())).collect(),
            id_to_key: mapping.mappings.into_iter().collect(),
            metadata: mapping.metadata,
        };

        info!(
            vectors = entries.id_to_key.len(),
            path = %index_path.display(),
            "loaded local vector index"
        );

        Ok(Self {
            index,
            entries: RwLock::new(entries),
            next_key: AtomicU64::new(mapping.next_key),
            config,
            path: None,
        })
    }

    /// Save index and sidecar to the path given to [`LocalIndex::open`]
    #[instrument(skip(self))]
    pub fn save(&self) -> Result<()> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| Error::Index("No path set for persistent index".to_string()))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let index_path = path.with_extension("usearch");
        self.index
            .save(path_str(&index_path)?)
            .map_err(|e| Error::Index(format!("Failed to save index: {e}")))?;

        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mapping = IdMapping {
            mappings: entries
                .id_to_key
                .iter()
                .map(|(id, key)| (id.clone(), *key))
                .collect(),
            next_key: self.next_key.load(Ordering::SeqCst),
            metadata: entries.metadata.clone(),
        };
        let json = serde_json::to_string_pretty(&mapping)
            .map_err(|e| Error::Serialization(format!("Failed to serialize mapping: {e}")))?;
        std::fs::write(path.with_extension("mapping.json"), json)?;

        info!(vectors = entries.id_to_key.len(), path = %index_path.display(), "saved local vector index");
        Ok(())
    }

    /// Insert a vector, replacing any existing vector with the same id
    #[instrument(skip(self, vector, metadata), fields(id = %id))]
    pub fn insert(&self, id: &str, vector: &[f32], metadata: Metadata) -> Result<()> {
        self.check_dimensions(vector)?;

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(old_key) = entries.id_to_key.remove(id) {
            self.index
                .remove(old_key)
                .map_err(|e| Error::Index(format!("Failed to remove vector: {e}")))?;
            entries.key_to_id.remove(&old_key);
        }

        if self.index.size() >= self.index.capacity() {
            let new_cap = std::cmp::max(self.index.capacity() * 2, 64);
            self.index
                .reserve(new_cap)
                .map_err(|e| Error::Index(format!("Failed to expand capacity: {e}")))?;
        }

        let key = self.next_key.fetch_add(1, Ordering::SeqCst);
        self.index
            .add(key, vector)
            .map_err(|e| Error::Index(format!("Failed to add vector: {e}")))?;

        entries.id_to_key.insert(id.to_string(), key);
        entries.key_to_id.insert(key, id.to_string());
        entries.metadata.insert(id.to_string(), metadata);

        debug!(key, "vector stored");
        Ok(())
    }

    /// Nearest neighbours of `query`, best first
    #[instrument(skip(self, query))]
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<Match>> {
        self.check_dimensions(query)?;
        if top_k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let results = self
            .index
            .search(query, top_k)
            .map_err(|e| Error::Search(format!("Search failed: {e}")))?;

        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let matches: Vec<Match> = results
            .keys
            .iter()
            .zip(results.distances.iter())
            .filter_map(|(key, distance)| {
                let id = entries.key_to_id.get(key)?;
                Some(Match {
                    id: id.clone(),
                    score: 1.0 - distance,
                    metadata: entries.metadata.get(id).cloned().unwrap_or_default(),
                })
            })
            .collect();

        debug!(found = matches.len(), "search complete");
        Ok(matches)
    }

    /// Number of stored vectors
    #[must_use]
    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.id_to_key.len()
    }

    /// Whether the index is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.config.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.config.dimensions,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| Error::Index("Invalid path encoding for index".to_string()))
}

#[async_trait]
impl VectorStore for LocalIndex {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize> {
        for record in records {
            self.check_dimensions(&record.values)?;
        }
        for record in records {
            self.insert(&record.id, &record.values, record.metadata.clone())?;
        }
        Ok(records.len())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<Match>> {
        self.search(vector, top_k)
    }

    fn name(&self) -> &str {
        "local"
    }

    async fn persist(&self) -> Result<()> {
        if self.path.is_some() {
            self.save()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_index() -> LocalIndex {
        LocalIndex::new(IndexConfig::new(4)).unwrap()
    }

    fn text(value: &str) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("text".to_string(), value.into());
        metadata
    }

    #[test]
    fn test_insert_and_search() {
        let index = create_test_index();
        index.insert("doc1", &[1.0, 0.0, 0.0, 0.0], text("one")).unwrap();
        index.insert("doc2", &[0.0, 1.0, 0.0, 0.0], text("two")).unwrap();
        index.insert("doc3", &[1.0, 1.0, 0.0, 0.0], text("three")).unwrap();

        assert_eq!(index.len(), 3);

        let results = index.search(&[1.0, 0.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(results[0].id, "doc1");
        assert_eq!(results[0].text(), Some("one"));
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn test_insert_replaces_existing_id() {
        let index = create_test_index();
        index.insert("doc1", &[1.0, 0.0, 0.0, 0.0], text("old")).unwrap();
        index.insert("doc1", &[0.0, 1.0, 0.0, 0.0], text("new")).unwrap();

        assert_eq!(index.len(), 1);
        let results = index.search(&[0.0, 1.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(results[0].id, "doc1");
        assert_eq!(results[0].text(), Some("new"));

        // The old vector is gone, so its direction only finds the new one
        let results = index.search(&[1.0, 0.0, 0.0, 0.0], 3).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].score.abs() < 1e-5);
    }

    #[test]
    fn test_dimension_mismatch() {
        let index = create_test_index();
        let err = index.insert("doc1", &[1.0, 0.0, 0.0], Metadata::new()).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 4, actual: 3 }));
        assert!(index.search(&[1.0], 1).is_err());
    }

    #[test]
    fn test_cosine_scores() {
        let index = LocalIndex::new(IndexConfig::new(2)).unwrap();
        index.insert("same", &[2.0, 0.0], Metadata::new()).unwrap();
        index.insert("orthogonal", &[0.0, 3.0], Metadata::new()).unwrap();

        let results = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(results[0].id, "same");
        assert!((results[0].score - 1.0).abs() < 1e-5);
        assert!(results[1].score.abs() < 1e-5);
    }

    #[test]
    fn test_capacity_grows() {
        let config = IndexConfig {
            capacity: 1,
            ..IndexConfig::new(2)
        };
        let index = LocalIndex::new(config).unwrap();
        for i in 0..100 {
            index
                .insert(&format!("v{i}"), &[1.0, i as f32], Metadata::new())
                .unwrap();
        }
        assert_eq!(index.len(), 100);
    }

    #[tokio::test]
    async fn test_upsert_validates_whole_batch_first() {
        let index = create_test_index();
        let records = vec![
            VectorRecord::new("ok", vec![1.0, 0.0, 0.0, 0.0]),
            VectorRecord::new("bad", vec![1.0]),
        ];
        assert!(index.upsert(&records).await.is_err());
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_persist_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vectors").join("passages");

        {
            let index = LocalIndex::open(&path, IndexConfig::new(4)).unwrap();
            index
                .upsert(&[
                    VectorRecord::new("a", vec![1.0, 0.0, 0.0, 0.0]).with_text("alpha"),
                    VectorRecord::new("b", vec![0.0, 0.0, 1.0, 0.0]).with_text("beta"),
                ])
                .await
                .unwrap();
            index.persist().await.unwrap();
        }

        assert!(path.with_extension("usearch").exists());
        assert!(path.with_extension("mapping.json").exists());

        let reopened = LocalIndex::open(&path, IndexConfig::new(4)).unwrap();
        assert_eq!(reopened.len(), 2);
        let results = reopened.query(&[0.0, 0.0, 1.0, 0.0], 1).await.unwrap();
        assert_eq!(results[0].id, "b");
        assert_eq!(results[0].text(), Some("beta"));

        // New keys do not collide with loaded ones
        reopened
            .insert("c", &[0.0, 1.0, 0.0, 0.0], Metadata::new())
            .unwrap();
        assert_eq!(reopened.len(), 3);
    }

    #[test]
    fn test_save_without_path_fails() {
        let index = create_test_index();
        assert!(matches!(index.save(), Err(Error::Index(_))));
    }
}
