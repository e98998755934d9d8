//! In-memory [`VectorIndex`] for tests and throwaway sessions.

use std::collections::HashSet;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use super::{check_shapes, cosine_similarity, top_k, VectorIndex};
use crate::models::{Chunk, ScoredChunk};

struct StoredChunk {
    document_id: String,
    chunk: Chunk,
    vector: Vec<f32>,
}

#[derive(Default)]
pub struct MemoryIndex {
    entries: RwLock<Vec<StoredChunk>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> anyhow::Error {
    anyhow::anyhow!("memory index lock poisoned")
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, document_id: &str, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        check_shapes(chunks, vectors)?;
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        for (chunk, vector) in chunks.iter().zip(vectors) {
            entries.push(StoredChunk {
                document_id: document_id.to_string(),
                chunk: chunk.clone(),
                vector: vector.clone(),
            });
        }
        Ok(())
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        let scored = entries
            .iter()
            .map(|e| ScoredChunk {
                chunk: e.chunk.clone(),
                score: cosine_similarity(query, &e.vector),
            })
            .collect();
        Ok(top_k(scored, k))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().map_err(|_| poisoned())?.len())
    }

    async fn remove_document(&self, document_id: &str) -> Result<usize> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let before = entries.len();
        entries.retain(|e| e.document_id != document_id);
        Ok(before - entries.len())
    }

    async fn retain_documents(&self, keep: &HashSet<String>) -> Result<usize> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let before = entries.len();
        entries.retain(|e| keep.contains(&e.document_id));
        Ok(before - entries.len())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().map_err(|_| poisoned())?.clear();
        Ok(())
    }
}
