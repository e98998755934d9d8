//! Core data models shared by the ingestion and answering pipelines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing state of an uploaded document.
///
/// Only fully indexed uploads are ever recorded, so there is a single state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Processed,
}

/// Catalog entry for one uploaded PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Short opaque identifier (8 hex chars).
    pub id: String,
    pub filename: String,
    pub size_bytes: u64,
    pub upload_time: DateTime<Utc>,
    /// Number of chunks written to the vector index for this upload.
    pub chunk_count: usize,
    pub status: DocumentStatus,
}

impl DocumentRecord {
    pub fn new(filename: &str, size_bytes: u64, chunk_count: usize) -> Self {
        Self {
            id: short_id(),
            filename: filename.to_string(),
            size_bytes,
            upload_time: Utc::now(),
            chunk_count,
            status: DocumentStatus::Processed,
        }
    }
}

fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Where a chunk came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub filename: String,
    /// 1-based page number.
    pub page: usize,
    /// Position of the chunk within its document, starting at 0.
    pub chunk_index: usize,
}

/// A bounded slice of extracted document text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A chunk returned from a nearest-neighbour query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
}
