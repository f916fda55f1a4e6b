//! Default plain-text chunk producer (C4): a sliding-window chunker that
//! snaps to a UTF-8 char boundary, prefers a paragraph/sentence/line/word
//! break near the target size, then steps forward leaving `chunk_overlap`
//! bytes of overlap. Handles purely-textual extensions (`.txt .md .html
//! .htm .json .xml .csv`) — PDF/image/audio chunk production is an external
//! contract (callers inject their own `ChunkProducer`).

use super::{ChunkProducer, ProducedChunk};
use crate::config::ChunkingConfig;
use crate::error::CoreError;

pub struct TextChunkProducer {
    chunk_size: usize,
    chunk_overlap: usize,
    min_chunk_size: usize,
}

impl TextChunkProducer {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            min_chunk_size: config.min_chunk_size,
        }
    }

    fn find_break_point(&self, text: &str, start: usize, preferred_end: usize) -> usize {
        let raw_search_start = preferred_end.saturating_sub(200).max(start);
        let search_start = snap_to_char_boundary(text, raw_search_start);
        let safe_end = snap_to_char_boundary(text, preferred_end);

        if search_start >= safe_end {
            return safe_end;
        }

        let search_region = &text[search_start..safe_end];

        if let Some(pos) = search_region.rfind("\n\n") {
            return search_start + pos + 2;
        }
        if let Some(pos) = search_region.rfind(". ") {
            return search_start + pos + 2;
        }
        if let Some(pos) = search_region.rfind(".\n") {
            return search_start + pos + 2;
        }
        if let Some(pos) = search_region.rfind('\n') {
            return search_start + pos + 1;
        }
        if let Some(pos) = search_region.rfind(' ') {
            return search_start + pos + 1;
        }

        safe_end
    }
}

impl ChunkProducer for TextChunkProducer {
    fn produce(&self, bytes: &[u8]) -> Result<Vec<ProducedChunk>, CoreError> {
        let text = String::from_utf8_lossy(bytes).into_owned();
        let chunks = self.chunk_text(&text)?;
        Ok(chunks.into_iter().map(ProducedChunk::text).collect())
    }
}

impl TextChunkProducer {
    fn chunk_text(&self, text: &str) -> Result<Vec<String>, CoreError> {
        if text.trim().is_empty() {
            return Err(CoreError::EmptyInput);
        }

        if text.len() <= self.chunk_size {
            if text.len() < self.min_chunk_size {
                return Ok(vec![text.to_string()]);
            }
            return Ok(vec![text.to_string()]);
        }

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < text.len() {
            let raw_end = (start + self.chunk_size).min(text.len());
            let end = snap_to_char_boundary(text, raw_end);

            let actual_end = if end < text.len() {
                self.find_break_point(text, start, end)
            } else {
                end
            };

            let chunk_text = &text[start..actual_end];
            if chunk_text.len() >= self.min_chunk_size || chunks.is_empty() {
                chunks.push(chunk_text.to_string());
            }

            let step = if actual_end - start > self.chunk_overlap {
                actual_end - start - self.chunk_overlap
            } else {
                actual_end - start
            };

            let raw_next = start + step.max(1);
            start = snap_to_char_boundary(text, raw_next);
            if start >= text.len() {
                break;
            }
        }

        Ok(chunks)
    }
}

fn snap_to_char_boundary(text: &str, pos: usize) -> usize {
    if pos >= text.len() {
        return text.len();
    }
    let mut p = pos;
    while p > 0 && !text.is_char_boundary(p) {
        p -= 1;
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_size: usize, overlap: usize, min: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size,
            chunk_overlap: overlap,
            min_chunk_size: min,
        }
    }

    #[test]
    fn test_short_text_produces_single_chunk() {
        let producer = TextChunkProducer::new(&config(1000, 100, 10));
        let chunks = producer.produce(b"a short document").unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "a short document");
        assert_eq!(chunks[0].modality, crate::types::Modality::Text);
        assert!(chunks[0].raw_bytes.is_none());
    }

    #[test]
    fn test_long_text_is_split_with_overlap() {
        let producer = TextChunkProducer::new(&config(50, 10, 5));
        let text = "Sentence one is here. Sentence two follows along. Sentence three ends it.";
        let chunks = producer.produce(text.as_bytes()).unwrap();
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.content.len() <= 60);
        }
    }

    #[test]
    fn test_empty_input_is_rejected() {
        let producer = TextChunkProducer::new(&config(100, 10, 5));
        assert!(matches!(producer.produce(b"   "), Err(CoreError::EmptyInput)));
    }

    #[test]
    fn test_breaks_prefer_sentence_boundaries() {
        let producer = TextChunkProducer::new(&config(30, 5, 5));
        let text = "First sentence here. Second sentence here. Third sentence here.";
        let chunks = producer.produce(text.as_bytes()).unwrap();
        // At least one chunk boundary should land right after a ". "
        assert!(chunks.iter().any(|c| c.content.trim_end().ends_with('.')));
    }
}
