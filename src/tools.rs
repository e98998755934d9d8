//! Tools the answering agent can invoke.
//!
//! A [`Tool`] declares a name, a one-line description and an OpenAI
//! function-calling parameter schema; the agent offers every registered tool
//! to the model and dispatches requests by name through the [`ToolRegistry`].
//!
//! The only built-in tool is [`RetrievalTool`] (`pdf_retriever`), which
//! embeds the model's query and returns the nearest chunks from the index.
//!
//! A [`ToolError`] separates a bad request from the model, which is reported
//! back to it, from a failing backend, which ends the answer.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::embedding::Embedder;
use crate::index::VectorIndex;
use crate::llm::ToolSpec;
use crate::models::Chunk;

pub const RETRIEVER_NAME: &str = "pdf_retriever";
pub const RETRIEVER_DESCRIPTION: &str = "Search and return relevant excerpts from uploaded PDF documents. \
Use this when the question is about content in the user's uploaded files.";

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The model's arguments were unusable.
    #[error("{0}")]
    InvalidArguments(String),
    /// The embedder or index failed.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Result of one tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Text handed back to the model.
    pub payload: String,
    /// Chunks the tool surfaced, used for source attribution.
    pub chunks: Vec<Chunk>,
}

#[async_trait]
pub trait Tool: Send + Sync {
    /// Identifier the model uses to request this tool.
    fn name(&self) -> &str;

    /// One-line description the model uses to decide whether to call it.
    fn description(&self) -> &str;

    /// JSON Schema (`type: "object"`) for the tool's arguments.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Ordered set of tools, looked up by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool. A later tool with the same name shadows nothing;
    /// lookups return the first match.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Embeds a query and returns the `top_k` nearest chunks.
pub struct RetrievalTool {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl RetrievalTool {
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>, top_k: usize) -> Self {
        Self {
            index,
            embedder,
            top_k,
        }
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<Chunk>, ToolError> {
        if query.trim().is_empty() {
            return Err(ToolError::InvalidArguments("query must not be empty".into()));
        }
        let vector = self.embedder.embed_one(query).await?;
        let hits = self.index.nearest(&vector, self.top_k).await?;
        Ok(hits.into_iter().map(|h| h.chunk).collect())
    }
}

#[async_trait]
impl Tool for RetrievalTool {
    fn name(&self) -> &str {
        RETRIEVER_NAME
    }

    fn description(&self) -> &str {
        RETRIEVER_DESCRIPTION
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "What to look for in the uploaded documents" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let query = params["query"].as_str().unwrap_or("");
        let chunks = self.retrieve(query).await?;
        Ok(ToolOutput {
            payload: format_excerpts(&chunks),
            chunks,
        })
    }
}

/// Render chunks as numbered excerpts with provenance.
pub fn format_excerpts(chunks: &[Chunk]) -> String {
    if chunks.is_empty() {
        return "No relevant excerpts found in the uploaded documents.".to_string();
    }
    chunks
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "[{}] {} (page {})\n{}",
                i + 1,
                c.metadata.filename,
                c.metadata.page,
                c.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::memory::MemoryIndex;
    use crate::index::test_support::chunk;

    /// Maps text to a 2-d vector by which keyword it mentions.
    struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keyword"
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("revenue") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }
    }

    async fn tool() -> RetrievalTool {
        let index = Arc::new(MemoryIndex::new());
        index
            .upsert(
                "d1",
                &[
                    chunk("report.pdf", 0, "revenue grew 10%"),
                    chunk("notes.pdf", 0, "lunch at noon"),
                ],
                &[vec![1.0, 0.0], vec![0.0, 1.0]],
            )
            .await
            .unwrap();
        RetrievalTool::new(index, Arc::new(KeywordEmbedder), 1)
    }

    #[tokio::test]
    async fn execute_returns_chunks_and_payload() {
        let out = tool()
            .await
            .execute(json!({ "query": "what happened to revenue?" }))
            .await
            .unwrap();
        assert_eq!(out.chunks.len(), 1);
        assert_eq!(out.chunks[0].metadata.filename, "report.pdf");
        assert!(out.payload.starts_with("[1] report.pdf (page 1)"));
        assert!(out.payload.contains("revenue grew 10%"));
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let err = tool().await.execute(json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert!(err.to_string().contains("must not be empty"));
    }

    struct DownEmbedder;

    #[async_trait]
    impl Embedder for DownEmbedder {
        fn model_name(&self) -> &str {
            "down"
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            anyhow::bail!("embedding service unreachable")
        }
    }

    #[tokio::test]
    async fn embedder_failure_is_a_backend_error() {
        let tool = RetrievalTool::new(Arc::new(MemoryIndex::new()), Arc::new(DownEmbedder), 3);
        let err = tool.execute(json!({ "query": "revenue" })).await.unwrap_err();
        assert!(matches!(err, ToolError::Backend(_)));
        assert!(err.to_string().contains("embedding service unreachable"));
    }

    #[tokio::test]
    async fn registry_finds_by_name_and_exposes_specs() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(tool().await));
        assert_eq!(registry.len(), 1);
        assert!(registry.find(RETRIEVER_NAME).is_some());
        assert!(registry.find("web_search").is_none());

        let specs = registry.specs();
        assert_eq!(specs[0].name, "pdf_retriever");
        assert_eq!(specs[0].parameters["required"][0], "query");
    }

    #[test]
    fn empty_excerpts_message() {
        assert!(format_excerpts(&[]).contains("No relevant excerpts"));
    }
}
