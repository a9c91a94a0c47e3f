use crate::error::IngestError;
use crate::models::{PageText, TextChunk};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

pub const DEFAULT_CHUNK_MAX_CHARS: usize = 1_000;
pub const DEFAULT_CHUNK_OVERLAP_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_CHUNK_MAX_CHARS,
            overlap_chars: DEFAULT_CHUNK_OVERLAP_CHARS,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be greater than zero".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than max size {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

static RE_PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t\r\x{a0}]*\n").unwrap());

pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collapses whitespace inside paragraphs while keeping blank-line breaks.
pub fn normalize_paragraphs(text: &str) -> String {
    RE_PARAGRAPH_BREAK
        .split(text)
        .map(normalize_whitespace)
        .filter(|paragraph| !paragraph.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Slides a `max_chars` window over `text`, stepping back `overlap_chars`
/// between windows. Windows that would cut a word try to end on the last
/// whitespace in their second half.
pub fn split_with_overlap(text: &str, config: ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut pieces = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let mut end = (start + config.max_chars).min(chars.len());
        if end < chars.len() {
            let floor = start + config.max_chars / 2;
            if let Some(offset) = chars[floor..end].iter().rposition(|c| c.is_whitespace()) {
                if floor + offset > start {
                    end = floor + offset;
                }
            }
        }

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }

        if end == chars.len() {
            break;
        }

        let next = end.saturating_sub(config.overlap_chars);
        start = if next > start { next } else { end };
    }

    pieces
}

pub fn chunk_pages(pages: &[PageText], config: ChunkingConfig) -> Result<Vec<TextChunk>, IngestError> {
    config.validate()?;

    let mut chunks = Vec::new();
    let mut cursor = 0u64;

    for page in pages {
        let normalized = normalize_paragraphs(&page.text);
        for piece in split_with_overlap(&normalized, config) {
            chunks.push(TextChunk {
                chunk_id: make_chunk_id(page.number, cursor, &piece),
                index: cursor,
                page: page.number,
                text: piece,
            });
            cursor = cursor.saturating_add(1);
        }
    }

    Ok(chunks)
}

fn make_chunk_id(page: u32, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(page.to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(number: u32, text: &str) -> PageText {
        PageText {
            number,
            text: text.to_string(),
        }
    }

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\nof   spacing";
        let normalized = normalize_whitespace(input);
        assert_eq!(normalized, "A lot of spacing");
    }

    #[test]
    fn paragraph_breaks_survive_normalization() {
        let input = "First   line\ncontinues\n \nSecond\u{a0}paragraph";
        assert_eq!(
            normalize_paragraphs(input),
            "First line continues\n\nSecond paragraph"
        );
    }

    #[test]
    fn chunks_never_exceed_max_chars() {
        let config = ChunkingConfig {
            max_chars: 40,
            overlap_chars: 10,
        };
        let text = "lorem ipsum dolor sit amet ".repeat(20);
        let chunks = chunk_pages(&[page(1, &text)], config).unwrap();

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|chunk| chunk.text.chars().count() <= 40));
    }

    #[test]
    fn consecutive_windows_share_text() {
        let config = ChunkingConfig {
            max_chars: 10,
            overlap_chars: 4,
        };
        let pieces = split_with_overlap("abcdefghijklmnopqrstuvwxyz", config);

        assert_eq!(pieces[0], "abcdefghij");
        assert_eq!(pieces[1], "ghijklmnop");
        assert!(pieces.last().unwrap().ends_with('z'));
    }

    #[test]
    fn chunk_indices_run_across_pages() {
        let chunks = chunk_pages(
            &[page(1, "first page"), page(2, "second page")],
            ChunkingConfig::default(),
        )
        .unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].page, 1);
        assert_eq!(chunks[1].page, 2);
        assert_eq!(chunks[1].index, 1);
        assert_ne!(chunks[0].chunk_id, chunks[1].chunk_id);
    }

    #[test]
    fn no_pages_means_no_chunks() {
        let chunks = chunk_pages(&[], ChunkingConfig::default()).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn overlap_must_be_smaller_than_window() {
        let config = ChunkingConfig {
            max_chars: 10,
            overlap_chars: 10,
        };
        assert!(matches!(
            chunk_pages(&[page(1, "text")], config),
            Err(IngestError::InvalidChunkConfig(_))
        ));
    }
}
