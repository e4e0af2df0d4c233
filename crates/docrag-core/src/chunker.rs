//! Character-window chunking with sentence-aware cut points.
//!
//! A window of `chunk_size` characters slides over the text. Before cutting,
//! the window end is pulled back to just after the nearest `.`, `!`, `?` or
//! newline found within a short look-back range, so chunks tend to end on a
//! sentence. Consecutive windows share `overlap` characters.

use crate::error::{Error, Result};

/// Maximum number of characters the cut point may move back.
const BOUNDARY_LOOKBACK: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 500, overlap: 100 }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        let config = Self { chunk_size, overlap };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be positive".into()));
        }
        if self.overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

fn is_boundary(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '\n')
}

/// Split `text` into trimmed, non-empty chunks.
///
/// Lengths are counted in characters, never bytes. Text no longer than
/// `chunk_size` yields a single chunk (or none when it is blank).
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    if total <= config.chunk_size {
        let trimmed = text.trim();
        return if trimmed.is_empty() { Vec::new() } else { vec![trimmed.to_string()] };
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let mut end = (start + config.chunk_size).min(total);
        if end < total {
            let floor = (start + config.chunk_size / 2).max(end.saturating_sub(BOUNDARY_LOOKBACK));
            if let Some(cut) = (floor + 1..=end).rev().find(|&i| is_boundary(chars[i])) {
                end = cut + 1;
            }
        }

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        if end >= total {
            break;
        }
        let next = end.saturating_sub(config.overlap);
        start = if next > start { next } else { end };
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_sentences(count: usize) -> String {
        (0..count)
            .map(|i| format!("Sentence number {i} talks about topic {}. ", i * 7))
            .collect()
    }

    #[test]
    fn short_text_is_one_trimmed_chunk() {
        let config = ChunkingConfig::default();
        let chunks = chunk_text("  hello world  \n", &config);
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn blank_text_has_no_chunks() {
        let config = ChunkingConfig::new(10, 2).expect("config");
        assert!(chunk_text("   \n\t ", &config).is_empty());
        assert!(chunk_text("", &config).is_empty());
        assert!(chunk_text(&" ".repeat(40), &config).is_empty());
    }

    #[test]
    fn cuts_after_sentence_terminator() {
        let config = ChunkingConfig::new(50, 10).expect("config");
        let first = format!("{}.", "a".repeat(39));
        let text = format!("{first}{}", "b".repeat(60));
        let chunks = chunk_text(&text, &config);
        assert_eq!(chunks[0], first);
    }

    #[test]
    fn falls_back_to_raw_boundary() {
        let config = ChunkingConfig::new(20, 5).expect("config");
        let text = "x".repeat(50);
        let chunks = chunk_text(&text, &config);
        assert_eq!(chunks[0].chars().count(), 20);
        assert!(chunks.iter().all(|c| c.chars().count() <= 20));
    }

    #[test]
    fn chunks_cover_text_without_gaps() {
        let config = ChunkingConfig::new(120, 30).expect("config");
        let text = numbered_sentences(40);
        let chunks = chunk_text(&text, &config);
        assert!(chunks.len() > 1);

        let mut covered_to = 0usize;
        let mut search_from = 0usize;
        for chunk in &chunks {
            assert!(!chunk.trim().is_empty());
            let at = text[search_from..].find(chunk.as_str()).expect("chunk is a substring") + search_from;
            assert!(at <= covered_to, "gap before byte {at} (covered to {covered_to})");
            covered_to = covered_to.max(at + chunk.len());
            search_from = at;
        }
        assert_eq!(covered_to, text.trim_end().len());
    }

    #[test]
    fn consecutive_chunks_share_overlap() {
        let config = ChunkingConfig::new(50, 10).expect("config");
        let text = "y".repeat(130);
        let chunks = chunk_text(&text, &config);
        let lens: Vec<usize> = chunks.iter().map(|c| c.chars().count()).collect();
        // windows start at 0, 40, 80 and the last one reaches the end
        assert_eq!(lens, vec![50, 50, 50]);
    }

    #[test]
    fn stops_once_a_window_reaches_the_end() {
        let config = ChunkingConfig::new(50, 10).expect("config");
        let text: String = (0..130u8).map(|i| char::from(b'a' + i % 26)).collect();
        let chunks = chunk_text(&text, &config);
        // no trailing chunk made of just the final overlap
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.last().map(String::as_str), Some(&text[80..]));
        assert!(chunks.iter().all(|c| c.chars().count() > config.overlap));
    }

    #[test]
    fn multibyte_text_is_split_on_characters() {
        let config = ChunkingConfig::new(30, 5).expect("config");
        let text = "ação é ótima ".repeat(10);
        let chunks = chunk_text(&text, &config);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 30));
    }

    #[test]
    fn deterministic_for_same_input() {
        let config = ChunkingConfig::default();
        let text = numbered_sentences(100);
        assert_eq!(chunk_text(&text, &config), chunk_text(&text, &config));
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        assert!(matches!(ChunkingConfig::new(10, 10), Err(Error::InvalidConfig(_))));
        assert!(matches!(ChunkingConfig::new(0, 0), Err(Error::InvalidConfig(_))));
    }
}
