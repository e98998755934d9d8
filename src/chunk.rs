//! Overlapping fixed-size text chunker.
//!
//! Splits each extracted page into windows of at most `chunk_size`
//! characters, where consecutive windows of the same page share exactly
//! `overlap` characters. Window ends snap to the strongest nearby boundary
//! (paragraph, line, sentence, word) and fall back to a hard cut.
//!
//! # Guarantees
//!
//! - No chunk is longer than `chunk_size` characters.
//! - Dropping the first `overlap` characters of every chunk after the first
//!   and concatenating reconstructs the page exactly (see [`reassemble`]).
//! - Overlap never crosses a page boundary.
//! - Empty text produces no chunks.
//!
//! Lengths are counted in Unicode scalar values, never bytes, so chunk
//! boundaries are always valid UTF-8.
//!
//! # Example
//!
//! ```rust
//! use pdf_rag::chunk::{reassemble, split_text};
//!
//! let text = "First sentence. Second sentence. Third sentence.";
//! let pieces = split_text(text, 20, 5);
//! assert!(pieces.iter().all(|p| p.chars().count() <= 20));
//! assert_eq!(reassemble(&pieces, 5), text);
//! ```

use crate::models::{Chunk, ChunkMetadata};

/// Break-point candidates, strongest first.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "? ", "! ", " "];

/// Split every page into chunks stamped with `filename`, page number and a
/// running index across the whole document.
pub fn chunk_pages(pages: &[String], filename: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for (page_idx, page) in pages.iter().enumerate() {
        for text in split_text(page, chunk_size, overlap) {
            let chunk_index = chunks.len();
            chunks.push(Chunk {
                text,
                metadata: ChunkMetadata {
                    filename: filename.to_string(),
                    page: page_idx + 1,
                    chunk_index,
                },
            });
        }
    }
    chunks
}

/// Split one text segment into overlapping windows.
///
/// `overlap` is clamped to `chunk_size - 1`; a `chunk_size` of zero yields
/// nothing.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if chunk_size == 0 || text.is_empty() {
        return Vec::new();
    }
    let overlap = overlap.min(chunk_size - 1);
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();

    let mut pieces = Vec::new();
    let mut start = 0usize;
    loop {
        if len - start <= chunk_size {
            pieces.push(chars[start..].iter().collect());
            break;
        }
        let hard_end = start + chunk_size;
        // Only accept a break that leaves the chunk longer than the overlap,
        // and avoid snapping to a boundary in the first half of the window.
        let min_end = (start + overlap + 1).max(start + chunk_size / 2);
        let end = find_break(&chars, start, min_end, hard_end).unwrap_or(hard_end);
        pieces.push(chars[start..end].iter().collect());
        start = end - overlap;
    }
    pieces
}

/// Returns the largest end position in `[min_end, max_end]` that directly
/// follows a separator, trying separators in priority order.
fn find_break(chars: &[char], start: usize, min_end: usize, max_end: usize) -> Option<usize> {
    for sep in SEPARATORS {
        let sep: Vec<char> = sep.chars().collect();
        let lowest = min_end.max(start + sep.len());
        if lowest > max_end {
            continue;
        }
        for end in (lowest..=max_end).rev() {
            if chars[end - sep.len()..end] == sep[..] {
                return Some(end);
            }
        }
    }
    None
}

/// Inverse of [`split_text`]: joins pieces, dropping each later piece's
/// leading `overlap` characters.
pub fn reassemble(pieces: &[String], overlap: usize) -> String {
    let mut out = String::new();
    for (i, piece) in pieces.iter().enumerate() {
        if i == 0 {
            out.push_str(piece);
        } else {
            out.extend(piece.chars().skip(overlap));
        }
    }
    out
}
