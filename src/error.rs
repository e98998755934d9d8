//! Service-boundary error taxonomy.
//!
//! Internal plumbing returns `anyhow::Result`; the application context maps
//! failures into a [`RagError`] so the HTTP layer can pick a status code
//! without inspecting message text.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// Caller error: wrong file type, blank query, missing upload field.
    #[error("{0}")]
    InvalidInput(String),

    /// The PDF could not be read or contained no text.
    #[error("PDF extraction failed: {0}")]
    Extraction(String),

    /// Embedding or writing chunks to the vector index failed.
    #[error("indexing failed: {0}")]
    IndexWrite(String),

    /// The language model or retrieval backend failed while answering.
    #[error("{0}")]
    Answer(String),

    /// The persisted catalog exists but cannot be parsed.
    #[error("document catalog at {path} is corrupt: {message}")]
    CorruptCatalog { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type RagResult<T> = std::result::Result<T, RagError>;
