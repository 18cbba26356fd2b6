//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`RecursiveChunker`], which
//! splits hierarchically by paragraphs, lines, words, then characters and
//! re-merges the pieces into overlapping chunks.

use std::collections::VecDeque;

use crate::document::{Chunk, Document};

/// Separators tried from coarsest to finest: paragraph, line, word, character.
///
/// The empty string means "split between any two characters".
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// A strategy for splitting documents into chunks.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;

    /// Split many documents, keeping document order and chunk order.
    fn split(&self, documents: &[Document]) -> Vec<Chunk> {
        documents.iter().flat_map(|document| self.chunk(document)).collect()
    }
}

/// Splits text recursively on an ordered list of separators.
///
/// The text is first cut on the coarsest separator present. Any piece still
/// longer than `chunk_size` characters is cut again with the next separator,
/// and so on. Separators stay attached to the end of the piece they follow,
/// so no character is ever dropped. The pieces are then merged greedily into
/// chunks of at most `chunk_size` characters; each new chunk starts with the
/// trailing pieces of the previous chunk, up to `chunk_overlap` characters.
///
/// A piece that no separator can break (only possible when the separator list
/// does not end with `""`) becomes a single oversized chunk.
///
/// # Example
///
/// ```rust,ignore
/// use steve_rag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(1000, 200);
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker` with [`DEFAULT_SEPARATORS`].
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: maximum number of characters shared by consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replace the separator list (coarsest first).
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    /// Maximum characters per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Maximum characters shared by consecutive chunks.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

/// A byte range of the document together with its length in characters.
#[derive(Debug, Clone, Copy)]
struct Piece {
    start: usize,
    end: usize,
    chars: usize,
}

/// Cut `text[start..end]` into pieces no longer than `chunk_size` characters
/// where the separators allow it.
fn split_recursive(
    text: &str,
    start: usize,
    end: usize,
    chunk_size: usize,
    separators: &[String],
    out: &mut Vec<Piece>,
) {
    let slice = &text[start..end];
    let chars = slice.chars().count();
    if chars <= chunk_size {
        out.push(Piece { start, end, chars });
        return;
    }

    let Some(level) =
        separators.iter().position(|sep| sep.is_empty() || slice.contains(sep.as_str()))
    else {
        out.push(Piece { start, end, chars });
        return;
    };

    let finer = &separators[level + 1..];
    for (piece_start, piece_end) in split_keeping_separator(slice, &separators[level]) {
        split_recursive(text, start + piece_start, start + piece_end, chunk_size, finer, out);
    }
}

/// Split at a separator, keeping the separator attached to the preceding segment.
///
/// Returns byte ranges relative to `text`. An empty separator splits between characters.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<(usize, usize)> {
    if separator.is_empty() {
        return text.char_indices().map(|(i, c)| (i, i + c.len_utf8())).collect();
    }

    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push((start, end));
        start = end;
    }

    if start < text.len() {
        result.push((start, text.len()));
    }

    result
}

/// Greedily merge pieces into chunk byte ranges, carrying up to
/// `chunk_overlap` characters of trailing pieces into the next chunk.
fn merge_pieces(pieces: &[Piece], chunk_size: usize, chunk_overlap: usize) -> Vec<(usize, usize)> {
    let mut chunks = Vec::new();
    let mut window: VecDeque<Piece> = VecDeque::new();
    let mut total = 0;

    for piece in pieces {
        if total + piece.chars > chunk_size {
            if let (Some(first), Some(last)) = (window.front(), window.back()) {
                chunks.push((first.start, last.end));
            }
            while let Some(front) = window.front() {
                if total > chunk_overlap || total + piece.chars > chunk_size {
                    total -= front.chars;
                    window.pop_front();
                } else {
                    break;
                }
            }
        }
        window.push_back(*piece);
        total += piece.chars;
    }

    if let (Some(first), Some(last)) = (window.front(), window.back()) {
        chunks.push((first.start, last.end));
    }

    chunks
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.text.is_empty() {
            return Vec::new();
        }

        let text = &document.text;
        let mut pieces = Vec::new();
        split_recursive(text, 0, text.len(), self.chunk_size, &self.separators, &mut pieces);

        merge_pieces(&pieces, self.chunk_size, self.chunk_overlap)
            .into_iter()
            .enumerate()
            .map(|(i, (start, end))| Chunk {
                text: text[start..end].to_string(),
                source: document.source.clone(),
                sequence_index: i,
                offset: start,
            })
            .collect()
    }
}
