//! Similarity store — embedded chunks with nearest-neighbour retrieval.
//!
//! Three pieces of state move together:
//! - a [`FlatIndex`] of vectors addressed by row
//! - a docstore of documents keyed by UUID
//! - the row → docstore id mapping
//!
//! On disk each piece is its own JSON file (`index.json`, `docstore.json`,
//! `index_to_docstore_id.json`) inside a numbered snapshot directory:
//!
//! ```text
//! vectorstore/
//!   CURRENT              -> "snapshot-00000002"
//!   snapshot-00000002/   index.json, docstore.json, index_to_docstore_id.json
//! ```
//!
//! A persist writes a complete new snapshot, then replaces `CURRENT` with a
//! single rename. Until that rename lands, restore keeps reading the
//! previous snapshot, so a failed or interrupted persist never mixes files
//! from two generations.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use codeloop_core::embedding::Embedder;
use codeloop_core::error::MemoryError;
use codeloop_core::memory::{ChunkMetadata, ContextChunk};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::index::FlatIndex;

pub const INDEX_FILE: &str = "index.json";
pub const DOCSTORE_FILE: &str = "docstore.json";
pub const MAPPING_FILE: &str = "index_to_docstore_id.json";
/// Names the live snapshot directory.
pub const CURRENT_FILE: &str = "CURRENT";

const SNAPSHOT_PREFIX: &str = "snapshot-";

/// Default number of neighbours returned by [`SimilarityStore::search`].
pub const DEFAULT_K: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDocument {
    content: String,
    #[serde(default)]
    metadata: ChunkMetadata,
    inserted_at: DateTime<Utc>,
}

/// Vector store over an opaque [`Embedder`].
pub struct SimilarityStore {
    embedder: Arc<dyn Embedder>,
    index: FlatIndex,
    docstore: HashMap<String, StoredDocument>,
    row_ids: Vec<String>,
    k: usize,
}

impl SimilarityStore {
    /// Create an empty store. The embedder is probed once to fix the
    /// vector dimension.
    pub async fn new(embedder: Arc<dyn Embedder>, k: usize) -> Result<Self, MemoryError> {
        let dimension = embedder.probe_dimension().await?;
        debug!(embedder = %embedder.name(), dimension, "Created empty similarity store");

        Ok(Self {
            embedder,
            index: FlatIndex::new(dimension),
            docstore: HashMap::new(),
            row_ids: Vec::new(),
            k: k.max(1),
        })
    }

    /// Load a store previously written by [`persist`](Self::persist).
    ///
    /// A missing directory or `CURRENT` file yields an empty store.
    pub async fn restore(
        dir: &Path,
        embedder: Arc<dyn Embedder>,
        k: usize,
    ) -> Result<Self, MemoryError> {
        let Some(snapshot) = current_snapshot(dir)? else {
            info!(dir = %dir.display(), "No saved store found, starting empty");
            return Self::new(embedder, k).await;
        };

        let index: FlatIndex = read_json(&snapshot.join(INDEX_FILE))?;
        let docstore: HashMap<String, StoredDocument> = read_json(&snapshot.join(DOCSTORE_FILE))?;
        let mapping: BTreeMap<usize, String> = read_json(&snapshot.join(MAPPING_FILE))?;

        index.validate()?;

        if mapping.len() != index.len() {
            return Err(MemoryError::Corrupted(format!(
                "index has {} rows but the id mapping has {} entries",
                index.len(),
                mapping.len()
            )));
        }

        let mut row_ids = Vec::with_capacity(mapping.len());
        for (expected_row, (row, id)) in mapping.into_iter().enumerate() {
            if row != expected_row {
                return Err(MemoryError::Corrupted(format!(
                    "id mapping has no entry for row {expected_row}"
                )));
            }
            if !docstore.contains_key(&id) {
                return Err(MemoryError::Corrupted(format!(
                    "row {row} maps to id {id}, which is not in the docstore"
                )));
            }
            row_ids.push(id);
        }

        let dimension = embedder.probe_dimension().await?;
        if dimension != index.dimension() {
            return Err(MemoryError::DimensionMismatch {
                expected: index.dimension(),
                actual: dimension,
            });
        }

        info!(
            snapshot = %snapshot.display(),
            entries = row_ids.len(),
            dimension,
            "Restored similarity store"
        );

        Ok(Self {
            embedder,
            index,
            docstore,
            row_ids,
            k: k.max(1),
        })
    }

    /// The `k` nearest chunks to `query`, nearest first.
    pub async fn search(&self, query: &str) -> Result<Vec<ContextChunk>, MemoryError> {
        self.search_with_limit(query, self.k).await
    }

    /// Like [`search`](Self::search) with an explicit neighbour count.
    pub async fn search_with_limit(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ContextChunk>, MemoryError> {
        if self.index.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed(query).await?;
        let hits = self
            .index
            .search(&vector, k)
            .map_err(|e| MemoryError::QueryFailed(e.to_string()))?;

        let mut chunks = Vec::with_capacity(hits.len());
        for (row, distance) in hits {
            let id = &self.row_ids[row];
            let doc = self.docstore.get(id).ok_or_else(|| {
                MemoryError::Corrupted(format!("row {row} maps to missing id {id}"))
            })?;
            chunks.push(ContextChunk {
                id: id.clone(),
                content: doc.content.clone(),
                metadata: doc.metadata.clone(),
                inserted_at: doc.inserted_at,
                distance,
            });
        }

        debug!(results = chunks.len(), "Similarity search complete");
        Ok(chunks)
    }

    /// Embed and store `content`, returning its new id.
    pub async fn insert(
        &mut self,
        content: &str,
        metadata: ChunkMetadata,
    ) -> Result<String, MemoryError> {
        let vector = self.embedder.embed(content).await?;
        if vector.len() != self.index.dimension() {
            return Err(MemoryError::DimensionMismatch {
                expected: self.index.dimension(),
                actual: vector.len(),
            });
        }

        let id = self.fresh_id();
        self.index.add(vector)?;
        self.row_ids.push(id.clone());
        self.docstore.insert(
            id.clone(),
            StoredDocument {
                content: content.to_string(),
                metadata,
                inserted_at: Utc::now(),
            },
        );

        debug!(id = %id, rows = self.row_ids.len(), "Inserted chunk");
        Ok(id)
    }

    /// Write the store into `dir` as a new snapshot, creating `dir` if
    /// needed, and make it the live one.
    ///
    /// On error the previously live snapshot (if any) stays live.
    pub fn persist(&self, dir: &Path) -> Result<(), MemoryError> {
        let generation = match read_current(dir)? {
            Some(name) => parse_generation(&name)? + 1,
            None => 1,
        };
        let name = format!("{SNAPSHOT_PREFIX}{generation:08}");
        let snapshot = dir.join(&name);

        // A crashed persist may have left this directory half written; every
        // file in it is replaced below.
        std::fs::create_dir_all(&snapshot).map_err(|e| {
            MemoryError::Storage(format!("Failed to create snapshot {}: {e}", snapshot.display()))
        })?;

        let mapping: BTreeMap<usize, &str> = self
            .row_ids
            .iter()
            .enumerate()
            .map(|(row, id)| (row, id.as_str()))
            .collect();

        write_atomic(&snapshot, INDEX_FILE, &serialize(&self.index)?)?;
        write_atomic(&snapshot, DOCSTORE_FILE, &serialize(&self.docstore)?)?;
        write_atomic(&snapshot, MAPPING_FILE, &serialize(&mapping)?)?;
        write_atomic(dir, CURRENT_FILE, name.as_bytes())?;

        remove_stale_snapshots(dir, &name);
        debug!(snapshot = %snapshot.display(), entries = self.row_ids.len(), "Persisted similarity store");
        Ok(())
    }

    /// Look up a stored chunk by id.
    pub fn get(&self, id: &str) -> Option<ContextChunk> {
        self.docstore.get(id).map(|doc| ContextChunk {
            id: id.to_string(),
            content: doc.content.clone(),
            metadata: doc.metadata.clone(),
            inserted_at: doc.inserted_at,
            distance: 0.0,
        })
    }

    pub fn len(&self) -> usize {
        self.row_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_ids.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn k(&self) -> usize {
        self.k
    }

    fn fresh_id(&self) -> String {
        loop {
            let id = Uuid::new_v4().to_string();
            if !self.docstore.contains_key(&id) {
                return id;
            }
        }
    }
}

impl std::fmt::Debug for SimilarityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityStore")
            .field("embedder", &self.embedder.name())
            .field("dimension", &self.index.dimension())
            .field("entries", &self.row_ids.len())
            .field("k", &self.k)
            .finish()
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, MemoryError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        MemoryError::Storage(format!("Failed to read {}: {e}", path.display()))
    })?;
    serde_json::from_str(&content)
        .map_err(|e| MemoryError::Corrupted(format!("Failed to parse {}: {e}", path.display())))
}

/// The live snapshot directory of the store in `dir`, if one was saved.
pub fn current_snapshot(dir: &Path) -> Result<Option<PathBuf>, MemoryError> {
    Ok(read_current(dir)?.map(|name| dir.join(name)))
}

fn read_current(dir: &Path) -> Result<Option<String>, MemoryError> {
    let path = dir.join(CURRENT_FILE);
    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let name = content.trim();
            if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
                return Err(MemoryError::Corrupted(format!(
                    "{} does not name a snapshot: {name:?}",
                    path.display()
                )));
            }
            Ok(Some(name.to_string()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(MemoryError::Storage(format!("Failed to read {}: {e}", path.display()))),
    }
}

fn parse_generation(name: &str) -> Result<u64, MemoryError> {
    name.strip_prefix(SNAPSHOT_PREFIX)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| MemoryError::Corrupted(format!("Unrecognised snapshot name {name:?}")))
}

/// Best effort: a leftover snapshot costs disk space, never correctness.
fn remove_stale_snapshots(dir: &Path, live: &str) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.filter_map(Result::ok) {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name == live || !name.starts_with(SNAPSHOT_PREFIX) {
            continue;
        }
        if let Err(e) = std::fs::remove_dir_all(entry.path()) {
            warn!(snapshot = %entry.path().display(), error = %e, "Failed to remove old snapshot");
        }
    }
}

fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, MemoryError> {
    serde_json::to_vec(value).map_err(|e| MemoryError::Storage(format!("Failed to serialize store: {e}")))
}

/// Write `bytes` to a synced temp file in `dir`, then rename it over `name`.
fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), MemoryError> {
    let target = dir.join(name);
    let storage = |e: &dyn std::fmt::Display| {
        MemoryError::Storage(format!("Failed to write {}: {e}", target.display()))
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| storage(&e))?;
    tmp.write_all(bytes).map_err(|e| storage(&e))?;
    tmp.as_file().sync_all().map_err(|e| storage(&e))?;
    tmp.persist(&target).map_err(|e| storage(&e.error))?;
    Ok(())
}
