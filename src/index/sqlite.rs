//! SQLite-backed [`VectorIndex`].
//!
//! One table holds chunk text, provenance and the embedding as a
//! little-endian f32 BLOB. Search loads every vector and ranks by cosine
//! similarity in process.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use super::{blob_to_vec, check_shapes, cosine_similarity, top_k, vec_to_blob, VectorIndex};
use crate::models::{Chunk, ChunkMetadata, ScoredChunk};

pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    /// Open (creating if needed) the index database at `path` and apply the schema.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        migrate(&pool).await?;
        Ok(Self { pool })
    }
}

async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            filename TEXT NOT NULL,
            page INTEGER NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            UNIQUE(document_id, chunk_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(pool)
        .await?;

    Ok(())
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn upsert(&self, document_id: &str, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        check_shapes(chunks, vectors)?;
        let mut tx = self.pool.begin().await?;

        for (chunk, vector) in chunks.iter().zip(vectors) {
            sqlx::query(
                r#"
                INSERT INTO chunks (document_id, chunk_index, filename, page, text, embedding)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(document_id, chunk_index) DO UPDATE SET
                    filename = excluded.filename,
                    page = excluded.page,
                    text = excluded.text,
                    embedding = excluded.embedding
                "#,
            )
            .bind(document_id)
            .bind(chunk.metadata.chunk_index as i64)
            .bind(&chunk.metadata.filename)
            .bind(chunk.metadata.page as i64)
            .bind(&chunk.text)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let rows = sqlx::query("SELECT chunk_index, filename, page, text, embedding FROM chunks")
            .fetch_all(&self.pool)
            .await?;

        let scored = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let chunk_index: i64 = row.get("chunk_index");
                let page: i64 = row.get("page");
                ScoredChunk {
                    score: cosine_similarity(query, &blob_to_vec(&blob)),
                    chunk: Chunk {
                        text: row.get("text"),
                        metadata: ChunkMetadata {
                            filename: row.get("filename"),
                            page: page as usize,
                            chunk_index: chunk_index as usize,
                        },
                    },
                }
            })
            .collect();

        Ok(top_k(scored, k))
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn remove_document(&self, document_id: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn retain_documents(&self, keep: &HashSet<String>) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let ids: Vec<String> = sqlx::query_scalar("SELECT DISTINCT document_id FROM chunks")
            .fetch_all(&mut *tx)
            .await?;

        let mut removed = 0usize;
        for id in ids.iter().filter(|id| !keep.contains(*id)) {
            let result = sqlx::query("DELETE FROM chunks WHERE document_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            removed += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM chunks").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::test_support::chunk;
    use tempfile::TempDir;

    #[tokio::test]
    async fn persists_across_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data/index.sqlite");

        {
            let index = SqliteIndex::open(&path).await.unwrap();
            index
                .upsert(
                    "d1",
                    &[chunk("report.pdf", 0, "revenue grew"), chunk("report.pdf", 1, "costs fell")],
                    &[vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]],
                )
                .await
                .unwrap();
            index.pool.close().await;
        }

        let index = SqliteIndex::open(&path).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 2);

        let hits = index.nearest(&[0.0, 1.0, 0.1], 2).await.unwrap();
        assert_eq!(hits[0].chunk.text, "costs fell");
        assert_eq!(hits[0].chunk.metadata.filename, "report.pdf");
        assert_eq!(hits[0].chunk.metadata.chunk_index, 1);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn orphan_cleanup_and_clear() {
        let tmp = TempDir::new().unwrap();
        let index = SqliteIndex::open(&tmp.path().join("index.sqlite")).await.unwrap();
        index
            .upsert("kept", &[chunk("a.pdf", 0, "a")], &[vec![1.0]])
            .await
            .unwrap();
        index
            .upsert(
                "orphan",
                &[chunk("b.pdf", 0, "b"), chunk("b.pdf", 1, "c")],
                &[vec![1.0], vec![0.5]],
            )
            .await
            .unwrap();

        let keep: HashSet<String> = ["kept".to_string()].into_iter().collect();
        assert_eq!(index.retain_documents(&keep).await.unwrap(), 2);
        assert_eq!(index.count().await.unwrap(), 1);

        assert_eq!(index.remove_document("kept").await.unwrap(), 1);
        index
            .upsert("again", &[chunk("c.pdf", 0, "d")], &[vec![1.0]])
            .await
            .unwrap();
        index.clear().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
    }
}
