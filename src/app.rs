//! Application context.
//!
//! [`App`] owns every piece of process state (catalog, vector index,
//! embedder, answering agent) and is shared as `Arc<App>` by the HTTP
//! handlers and CLI commands. The ingestion pipeline and clear-all live here
//! because they are the only operations that touch both stores.
//!
//! Catalog and index writes are serialized by the async mutex around the
//! [`DocumentStore`]. Extraction and embedding run before the lock is taken.

use anyhow::Result;
use serde::Serialize;
use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::agent::Agent;
use crate::catalog::DocumentStore;
use crate::chunk::chunk_pages;
use crate::config::Config;
use crate::embedding::{create_embedder, embed_batched, Embedder};
use crate::error::{RagError, RagResult};
use crate::extract::{is_pdf_filename, PageExtractor, PdfExtractor};
use crate::index::{open_index, VectorIndex};
use crate::llm::{create_chat_model, ChatModel};
use crate::models::DocumentRecord;
use crate::tools::{RetrievalTool, ToolRegistry};

/// Result of a question, always returned with HTTP 200.
#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub sources: Vec<String>,
    pub context_used: bool,
    /// Number of distinct source documents the answer drew on.
    pub relevant_chunks_found: usize,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub documents: usize,
    pub chunks: usize,
}

pub struct App {
    config: Config,
    catalog: Mutex<DocumentStore>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn PageExtractor>,
    agent: Agent,
}

impl App {
    /// Build the context from configuration: load the catalog, open the
    /// index and construct the remote backends.
    pub async fn build(config: Config) -> Result<Self> {
        let index = open_index(&config.storage).await?;
        let embedder = create_embedder(&config.embedding)?;
        let model = create_chat_model(&config.llm)?;
        Self::from_parts(config, index, embedder, model).await
    }

    /// Assemble from already-constructed backends. Index chunks belonging
    /// to documents absent from the catalog are removed.
    pub async fn from_parts(
        config: Config,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn ChatModel>,
    ) -> Result<Self> {
        let catalog = DocumentStore::load(&config.storage.catalog_path)?;

        let known: HashSet<String> = catalog.list().iter().map(|d| d.id.clone()).collect();
        let removed = index.retain_documents(&known).await?;
        if removed > 0 {
            tracing::warn!(chunks = removed, "removed orphaned index chunks");
        }

        let mut tools = ToolRegistry::new();
        tools.register(Box::new(RetrievalTool::new(
            index.clone(),
            embedder.clone(),
            config.retrieval.top_k,
        )));
        let agent = Agent::new(
            model,
            Arc::new(tools),
            config.llm.system_prompt.clone(),
            config.llm.max_turns,
        );

        Ok(Self {
            config,
            catalog: Mutex::new(catalog),
            index,
            embedder,
            extractor: Arc::new(PdfExtractor),
            agent,
        })
    }

    /// Replace the PDF text extractor.
    pub fn with_extractor(mut self, extractor: Arc<dyn PageExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn chat_model(&self) -> &Arc<dyn ChatModel> {
        self.agent.model()
    }

    /// Extract, chunk, embed and index one uploaded PDF, then record it in
    /// the catalog.
    pub async fn ingest_pdf(&self, filename: &str, bytes: &[u8]) -> RagResult<DocumentRecord> {
        let filename = base_name(filename);
        if filename.is_empty() {
            return Err(RagError::InvalidInput("No file provided".into()));
        }
        if !is_pdf_filename(filename) {
            return Err(RagError::InvalidInput(
                "Only PDF files are supported".into(),
            ));
        }

        // Removed on drop, including when extraction fails.
        let upload = self.spool(bytes)?;
        let pages = self
            .extractor
            .extract(upload.path())
            .await
            .map_err(|e| RagError::Extraction(e.to_string()))?;
        drop(upload);

        let chunking = &self.config.chunking;
        let chunks = chunk_pages(&pages, filename, chunking.chunk_size, chunking.chunk_overlap);
        if chunks.is_empty() {
            return Err(RagError::Extraction("no extractable text in document".into()));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_batched(
            self.embedder.as_ref(),
            &texts,
            self.config.embedding.batch_size,
            self.config.embedding.dims,
        )
        .await
        .map_err(|e| RagError::IndexWrite(format!("{:#}", e)))?;

        let record = DocumentRecord::new(filename, bytes.len() as u64, chunks.len());

        let mut catalog = self.catalog.lock().await;
        self.index
            .upsert(&record.id, &chunks, &vectors)
            .await
            .map_err(|e| RagError::IndexWrite(format!("{:#}", e)))?;

        if let Err(e) = catalog.append(record.clone()).await {
            if let Err(cleanup) = self.index.remove_document(&record.id).await {
                tracing::error!(
                    document_id = %record.id,
                    error = %cleanup,
                    "failed to remove chunks after catalog write failure"
                );
            }
            return Err(e);
        }

        tracing::info!(
            document_id = %record.id,
            filename = %record.filename,
            pages = pages.len(),
            chunks = record.chunk_count,
            "ingested document"
        );
        Ok(record)
    }

    fn spool(&self, bytes: &[u8]) -> RagResult<tempfile::NamedTempFile> {
        let dir = self
            .config
            .storage
            .temp_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        std::fs::create_dir_all(&dir)?;
        let mut file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(".pdf")
            .tempfile_in(dir)?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(file)
    }

    /// Answer a question. Backend failures are reported in the response
    /// body; only a blank query is an error.
    pub async fn ask(&self, query: &str, use_rag: bool) -> RagResult<AskResponse> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::InvalidInput("Query must not be empty".into()));
        }

        match self.agent.answer(query, use_rag).await {
            Ok(answer) => Ok(AskResponse {
                context_used: !answer.sources.is_empty(),
                relevant_chunks_found: answer.sources.len(),
                sources: answer.sources,
                answer: answer.text,
                success: true,
            }),
            Err(e) => {
                let err = RagError::Answer(format!("{:#}", e));
                tracing::error!(error = %err, use_rag, "failed to answer question");
                Ok(AskResponse {
                    answer: format!("Error: {}", err),
                    sources: Vec::new(),
                    context_used: false,
                    relevant_chunks_found: 0,
                    success: false,
                })
            }
        }
    }

    /// Catalog in upload order.
    pub async fn documents(&self) -> Vec<DocumentRecord> {
        self.catalog.lock().await.list().to_vec()
    }

    pub async fn health(&self) -> RagResult<Health> {
        let documents = self.catalog.lock().await.len();
        let chunks = self.index.count().await?;
        Ok(Health {
            status: "healthy",
            documents,
            chunks,
        })
    }

    /// Remove every document from the catalog and the index. Returns the
    /// number of catalog entries removed.
    ///
    /// The catalog goes first. If it cannot be deleted nothing has changed;
    /// if the index clear then fails, the leftover chunks are orphans that
    /// the next startup removes.
    pub async fn clear_all(&self) -> RagResult<usize> {
        let mut catalog = self.catalog.lock().await;
        let documents = catalog.len();
        catalog.clear().await?;
        if let Err(e) = self.index.clear().await {
            tracing::error!(error = %e, "catalog cleared but index clear failed");
            return Err(RagError::IndexWrite(format!("{:#}", e)));
        }
        tracing::info!(documents, "cleared all documents");
        Ok(documents)
    }
}

/// Strip any client-supplied directory components.
fn base_name(filename: &str) -> &str {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_strips_directories() {
        assert_eq!(base_name("report.pdf"), "report.pdf");
        assert_eq!(base_name("/tmp/x/report.pdf"), "report.pdf");
        assert_eq!(base_name("C:\\Users\\me\\report.PDF"), "report.PDF");
        assert_eq!(base_name("dir/"), "");
    }
}
