//! Feedback: make executed code part of long-term memory.
//!
//! Each executed block is written once to a uniquely named cache file, cut
//! into fixed-size character slices, and every slice is inserted into the
//! similarity store with the response's description as metadata.

use std::io::Write;
use std::path::{Path, PathBuf};

use codeloop_config::FeedbackConfig;
use codeloop_core::error::{CacheError, Error, MemoryError};
use codeloop_core::memory::ChunkMetadata;
use codeloop_core::runnable::ExecutionResult;
use codeloop_memory::SimilarityStore;
use tracing::{debug, info};
use uuid::Uuid;

/// Default slice length, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// What one block left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackReceipt {
    pub cache_file: PathBuf,
    pub chunk_ids: Vec<String>,
}

/// Writes cache files and store entries for executed code.
#[derive(Debug, Clone)]
pub struct FeedbackWriter {
    cache_dir: PathBuf,
    extension: String,
    chunk_size: usize,
}

impl FeedbackWriter {
    pub fn new(cache_dir: impl Into<PathBuf>, extension: impl Into<String>, chunk_size: usize) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            extension: extension.into().trim_start_matches('.').to_string(),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn from_config(config: &FeedbackConfig) -> Self {
        Self::new(&config.cache_dir, &config.extension, config.chunk_size)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Cache the code, then insert its slices into `store`.
    ///
    /// Stops at the first failure; files and slices written before it stay.
    pub async fn write(
        &self,
        result: &ExecutionResult,
        description: &str,
        store: &mut SimilarityStore,
    ) -> Result<FeedbackReceipt, Error> {
        let cache_file = self.write_cache_file(&result.code)?;

        let chunks = split_chunks(&result.code, self.chunk_size);
        let mut chunk_ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let id = store.insert(chunk, ChunkMetadata::new(description)).await?;
            chunk_ids.push(id);
        }

        debug!(
            cache_file = %cache_file.display(),
            chunks = chunk_ids.len(),
            "Recorded executed code"
        );

        Ok(FeedbackReceipt {
            cache_file,
            chunk_ids,
        })
    }

    /// Persist the store once all of a turn's slices are in.
    pub fn commit(&self, store: &SimilarityStore, dir: &Path) -> Result<(), MemoryError> {
        store.persist(dir)?;
        info!(dir = %dir.display(), entries = store.len(), "Saved similarity store");
        Ok(())
    }

    /// Write `code` to `<cache_dir>/<uuid>.<ext>`.
    ///
    /// The content goes to a temp file in the same directory first and is
    /// then linked into place without replacing anything, so a cache file
    /// is either complete or absent.
    pub fn write_cache_file(&self, code: &str) -> Result<PathBuf, CacheError> {
        let failed = |path: &Path, reason: String| CacheError::WriteFailed {
            path: path.to_path_buf(),
            reason,
        };

        std::fs::create_dir_all(&self.cache_dir)
            .map_err(|e| failed(self.cache_dir.as_path(), e.to_string()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.cache_dir)
            .map_err(|e| failed(self.cache_dir.as_path(), e.to_string()))?;
        tmp.write_all(code.as_bytes())
            .and_then(|()| tmp.flush())
            .map_err(|e| failed(tmp.path(), e.to_string()))?;

        loop {
            let target = self
                .cache_dir
                .join(format!("{}.{}", Uuid::new_v4(), self.extension));
            match tmp.persist_noclobber(&target) {
                Ok(_) => return Ok(target),
                Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                    tmp = e.file;
                }
                Err(e) => return Err(failed(target.as_path(), e.error.to_string())),
            }
        }
    }
}

/// Cut `text` into contiguous slices of `size` characters; the last one may
/// be shorter. Empty text gives no slices.
pub fn split_chunks(text: &str, size: usize) -> Vec<&str> {
    let size = size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (offset, _) in text.char_indices() {
        if count == size {
            chunks.push(&text[start..offset]);
            start = offset;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}
