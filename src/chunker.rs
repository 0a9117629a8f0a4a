//! Word-window chunking of raw documents into pipeline input.

use crate::graph::models::ChunkInput;

/// Splits text into overlapping word windows.
#[derive(Debug, Clone)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(200, 40)
    }
}

impl Chunker {
    /// `size` words per chunk, `overlap` words shared between neighbours.
    pub fn new(size: usize, overlap: usize) -> Self {
        Self {
            size: size.max(1),
            overlap: overlap.min(size.saturating_sub(1)),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split text into overlapping chunks. Whitespace is normalized to
    /// single spaces; empty input yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<ChunkInput> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Vec::new();
        }

        let step = self.size.saturating_sub(self.overlap).max(1);
        let mut chunks = Vec::new();
        let mut idx = 0;

        while idx < words.len() {
            let end = (idx + self.size).min(words.len());
            chunks.push(ChunkInput::new(words[idx..end].join(" ")));

            if end == words.len() {
                break;
            }
            idx += step;
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunker_respects_overlap() {
        let chunker = Chunker::new(4, 1);
        let chunks = chunker.chunk("one two three four five six seven");

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "one two three four");
        assert_eq!(chunks[1].text, "four five six seven");
    }

    #[test]
    fn chunker_empty_text_returns_empty() {
        let chunker = Chunker::new(4, 1);
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk(" \n\t").is_empty());
    }

    #[test]
    fn chunker_short_text_is_single_chunk() {
        let chunker = Chunker::default();
        let chunks = chunker.chunk("Alice   works\nat Google.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Alice works at Google.");
    }

    #[test]
    fn chunker_clamps_degenerate_settings() {
        let chunker = Chunker::new(0, 5);
        assert_eq!(chunker.size(), 1);
        assert_eq!(chunker.overlap(), 0);

        let chunks = chunker.chunk("a b c");
        assert_eq!(chunks.len(), 3);

        let chunker = Chunker::new(3, 10);
        assert_eq!(chunker.overlap(), 2);
    }
}
