//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the only surface the rest of the crate uses
//! to store and search embedded chunks, so backends are interchangeable:
//!
//! | Backend | Module | Persistence |
//! |---------|--------|-------------|
//! | SQLite  | [`sqlite`] | file at `storage.index_path` |
//! | Memory  | [`memory`] | none |
//!
//! Both perform brute-force cosine similarity. That is adequate for the
//! corpus sizes this service targets; ANN indexing is out of scope.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::StorageConfig;
use crate::models::{Chunk, ScoredChunk};

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Store `chunks` for `document_id`; `vectors[i]` embeds `chunks[i]`.
    async fn upsert(&self, document_id: &str, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()>;

    /// The `k` chunks most similar to `query`, best first.
    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    /// Total number of stored chunks.
    async fn count(&self) -> Result<usize>;

    /// Remove every chunk of one document. Returns the number removed.
    async fn remove_document(&self, document_id: &str) -> Result<usize>;

    /// Remove chunks whose document id is not in `keep`. Returns the number removed.
    async fn retain_documents(&self, keep: &HashSet<String>) -> Result<usize>;

    /// Remove everything.
    async fn clear(&self) -> Result<()>;
}

/// Open the backend selected by `storage.index_backend`.
pub async fn open_index(config: &StorageConfig) -> Result<Arc<dyn VectorIndex>> {
    match config.index_backend.as_str() {
        "sqlite" => Ok(Arc::new(sqlite::SqliteIndex::open(&config.index_path).await?)),
        "memory" => Ok(Arc::new(memory::MemoryIndex::new())),
        other => anyhow::bail!("Unknown index backend: {}", other),
    }
}

pub(crate) fn check_shapes(chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
    if chunks.len() != vectors.len() {
        anyhow::bail!(
            "chunk/vector count mismatch: {} chunks, {} vectors",
            chunks.len(),
            vectors.len()
        );
    }
    Ok(())
}

/// Sort by descending score and keep the top `k`.
pub(crate) fn top_k(mut scored: Vec<ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(k);
    scored
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB produced by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::models::{Chunk, ChunkMetadata};

    pub fn chunk(filename: &str, index: usize, text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            metadata: ChunkMetadata {
                filename: filename.to_string(),
                page: 1,
                chunk_index: index,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }
}
