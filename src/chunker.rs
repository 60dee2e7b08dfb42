//! Document chunking
//!
//! Splits extracted text into overlapping chunks for embedding. Splitting
//! follows a separator priority (paragraph break, line break, space, then
//! raw characters) so chunks break at the most natural boundary available
//! while never exceeding the configured size.

use std::collections::VecDeque;

use sha2::{Digest, Sha256};

/// Separator priority for recursive splitting. Character-level splitting is
/// the implicit last resort once these are exhausted.
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// A bounded segment of one document. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub document_name: String,
    pub chunk_index: usize,
    /// Content digest for duplicate detection across re-ingestion
    pub chunk_hash: String,
    pub total_chunks: usize,
}

pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        let config = ChunkerConfig {
            chunk_size: config.chunk_size.max(1),
            chunk_overlap: config.chunk_overlap,
        };
        Self { config }
    }

    /// Split `text` into ordered chunks. Whitespace-only chunks are dropped
    /// and indexes are dense from 0; empty input yields an empty sequence.
    pub fn chunk(&self, text: &str, document_name: &str) -> Vec<Chunk> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        let pieces = self.split_recursive(text, &SEPARATORS);
        let merged = self.merge_pieces(pieces);

        let kept: Vec<String> = merged
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        let total_chunks = kept.len();
        kept.into_iter()
            .enumerate()
            .map(|(chunk_index, text)| Chunk {
                chunk_hash: content_digest(&text),
                text,
                document_name: document_name.to_string(),
                chunk_index,
                total_chunks,
            })
            .collect()
    }

    /// Break text into pieces no longer than `chunk_size`, trying the
    /// highest-priority separator first and recursing into oversized pieces
    /// with the remaining separators. Separators stay attached to their
    /// piece so concatenating pieces reproduces the input.
    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        if text.len() <= self.config.chunk_size {
            return vec![text.to_string()];
        }

        let Some((sep, rest)) = separators.split_first() else {
            return self.split_chars(text);
        };

        if !text.contains(sep) {
            return self.split_recursive(text, rest);
        }

        let mut pieces = Vec::new();
        for part in text.split_inclusive(sep) {
            if part.len() <= self.config.chunk_size {
                pieces.push(part.to_string());
            } else {
                pieces.extend(self.split_recursive(part, rest));
            }
        }
        pieces
    }

    /// Last-resort split at character boundaries.
    fn split_chars(&self, text: &str) -> Vec<String> {
        let mut pieces = Vec::new();
        let mut current = String::new();
        for ch in text.chars() {
            if !current.is_empty() && current.len() + ch.len_utf8() > self.config.chunk_size {
                pieces.push(std::mem::take(&mut current));
            }
            current.push(ch);
        }
        if !current.is_empty() {
            pieces.push(current);
        }
        pieces
    }

    /// Greedily merge pieces into chunks of at most `chunk_size` characters,
    /// carrying the last `chunk_overlap` characters worth of pieces over
    /// into the next chunk.
    fn merge_pieces(&self, pieces: Vec<String>) -> Vec<String> {
        let size = self.config.chunk_size;
        let overlap = if self.config.chunk_overlap < size {
            self.config.chunk_overlap
        } else {
            size / 2
        };

        let mut chunks = Vec::new();
        let mut window: VecDeque<String> = VecDeque::new();
        let mut window_len = 0usize;

        for piece in pieces {
            let piece_len = piece.len();
            if !window.is_empty() && window_len + piece_len > size {
                chunks.push(join_window(&window));
                // Shrink the window to the overlap tail, and further if the
                // incoming piece still would not fit.
                while window_len > overlap
                    || (!window.is_empty() && window_len + piece_len > size)
                {
                    match window.pop_front() {
                        Some(front) => window_len -= front.len(),
                        None => break,
                    }
                }
            }
            window_len += piece.len();
            window.push_back(piece);
        }

        if !window.is_empty() {
            chunks.push(join_window(&window));
        }

        chunks
    }
}

fn join_window(window: &VecDeque<String>) -> String {
    window.iter().map(String::as_str).collect()
}

fn content_digest(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}
