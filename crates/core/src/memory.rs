//! Retrieved context — the unit the similarity store hands back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata attached to every stored chunk.
///
/// `description` is the narrative text the model wrote before its first
/// code fence. Any other keys ride along in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default)]
    pub description: String,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ChunkMetadata {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            extra: serde_json::Map::new(),
        }
    }
}

/// A single retrieved chunk of previously stored content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextChunk {
    /// Docstore id (UUID v4, never reused)
    pub id: String,

    /// The stored text
    pub content: String,

    /// Descriptive metadata
    #[serde(default)]
    pub metadata: ChunkMetadata,

    /// When the chunk was inserted
    pub inserted_at: DateTime<Utc>,

    /// Squared L2 distance to the query (set by search operations)
    #[serde(default)]
    pub distance: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_flattens_extra_keys() {
        let mut meta = ChunkMetadata::new("prints numbers");
        meta.extra.insert("language".into(), serde_json::json!("python"));

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["description"], "prints numbers");
        assert_eq!(json["language"], "python");

        let back: ChunkMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn metadata_tolerates_missing_description() {
        let meta: ChunkMetadata = serde_json::from_str("{}").unwrap();
        assert!(meta.description.is_empty());
        assert!(meta.extra.is_empty());
    }
}
