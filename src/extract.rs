//! PDF text extraction.
//!
//! Wraps `pdf-extract`, which is synchronous and can panic on malformed
//! input, so extraction runs on the blocking pool and a panic surfaces as an
//! ordinary [`ExtractError`].
//!
//! The application depends on the [`PageExtractor`] trait; [`PdfExtractor`]
//! is the production implementation.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub const PDF_EXTENSION: &str = ".pdf";

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("{0}")]
    Pdf(String),
    #[error("extractor crashed: {0}")]
    Panicked(String),
    #[error("no extractable text in document")]
    Empty,
}

/// `true` when `filename` carries a `.pdf` extension (any case).
pub fn is_pdf_filename(filename: &str) -> bool {
    filename.to_ascii_lowercase().ends_with(PDF_EXTENSION)
}

/// Extract text from the PDF at `path`, one string per page, in page order.
pub fn extract_pages_blocking(path: &Path) -> Result<Vec<String>, ExtractError> {
    let pages =
        pdf_extract::extract_text_by_pages(path).map_err(|e| ExtractError::Pdf(e.to_string()))?;
    if pages.iter().all(|p| p.trim().is_empty()) {
        return Err(ExtractError::Empty);
    }
    Ok(pages)
}

/// Async wrapper around [`extract_pages_blocking`].
pub async fn extract_pages(path: PathBuf) -> Result<Vec<String>, ExtractError> {
    tokio::task::spawn_blocking(move || extract_pages_blocking(&path))
        .await
        .map_err(|e| ExtractError::Panicked(e.to_string()))?
}

/// Turns a file on disk into per-page text.
#[async_trait]
pub trait PageExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<Vec<String>, ExtractError>;
}

/// `pdf-extract` on the blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

#[async_trait]
impl PageExtractor for PdfExtractor {
    async fn extract(&self, path: &Path) -> Result<Vec<String>, ExtractError> {
        extract_pages(path.to_path_buf()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_filename_check_ignores_case() {
        assert!(is_pdf_filename("report.pdf"));
        assert!(is_pdf_filename("REPORT.PDF"));
        assert!(!is_pdf_filename("notes.txt"));
        assert!(!is_pdf_filename("pdf"));
        assert!(!is_pdf_filename("archive.pdf.zip"));
    }

    #[tokio::test]
    async fn invalid_pdf_returns_error() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"not a pdf").unwrap();
        assert!(PdfExtractor.extract(tmp.path()).await.is_err());
    }
}
