//! Flat (exhaustive) vector index.

use codeloop_core::error::MemoryError;
use serde::{Deserialize, Serialize};

use crate::vector::nearest_neighbours;

/// Row-addressed vectors of one fixed dimension.
///
/// Rows are appended and never removed, so a row number stays valid for
/// the life of the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Append a vector and return its row.
    pub fn add(&mut self, vector: Vec<f32>) -> Result<usize, MemoryError> {
        self.check_dimension(&vector)?;
        self.vectors.push(vector);
        Ok(self.vectors.len() - 1)
    }

    /// The `k` nearest rows to `query` as `(row, squared distance)`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, MemoryError> {
        self.check_dimension(query)?;
        Ok(nearest_neighbours(&self.vectors, query, k))
    }

    /// Check that every stored row has the declared dimension.
    pub(crate) fn validate(&self) -> Result<(), MemoryError> {
        if let Some((row, v)) = self
            .vectors
            .iter()
            .enumerate()
            .find(|(_, v)| v.len() != self.dimension)
        {
            return Err(MemoryError::Corrupted(format!(
                "index row {row} has {} components, index dimension is {}",
                v.len(),
                self.dimension
            )));
        }
        Ok(())
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), MemoryError> {
        if vector.len() != self.dimension {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}
