use crate::local::bytes_to_mb;

/// Default chunk size, in characters.
pub const CHUNK_SIZE: usize = 1000;

/// Default overlap between consecutive chunks, in characters.
pub const CHUNK_OVERLAP: usize = 200;

/// Break points, most preferred first.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// A piece of a document sent to the embedder.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// Position in the document (0-indexed)
    pub index: usize,

    pub text: String,

    /// Character offset of the chunk start in the source text
    pub start: usize,
}

impl TextChunk {
    /// Create a snippet for display in query sources.
    pub fn snippet(text: &str, max_chars: usize) -> String {
        let mut chars = text.chars();
        let snippet: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{}...", snippet)
        } else {
            snippet
        }
    }
}

/// Splits text into overlapping character windows.
///
/// A window ends at the last paragraph break inside it if there is one in
/// its second half, else at a line break, sentence end or space, else
/// exactly at `chunk_size`.
#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(CHUNK_SIZE, CHUNK_OVERLAP)
    }
}

impl TextChunker {
    /// `overlap` is capped below half the chunk size so windows always advance.
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(2);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size / 2 - 1),
        }
    }

    pub fn split(&self, text: &str) -> Vec<TextChunk> {
        let chars: Vec<char> = text.chars().collect();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let mut end = (start + self.chunk_size).min(chars.len());
            if end < chars.len() {
                end = self.break_point(&chars, start, end);
            }

            let piece: String = chars[start..end].iter().collect();
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                chunks.push(TextChunk {
                    index: chunks.len(),
                    text: trimmed.to_string(),
                    start,
                });
            }

            if end >= chars.len() {
                break;
            }
            start = end - self.overlap;
        }

        chunks
    }

    fn break_point(&self, chars: &[char], start: usize, end: usize) -> usize {
        let earliest = start + self.chunk_size / 2;
        for separator in SEPARATORS {
            let sep: Vec<char> = separator.chars().collect();
            let found = (earliest..=end.saturating_sub(sep.len()))
                .rev()
                .find(|&i| chars[i..i + sep.len()] == sep[..]);
            if let Some(i) = found {
                return i + sep.len();
            }
        }
        end
    }
}

/// Vector count assumed before chunking: one per 1000 characters, plus 20%.
pub fn estimate_vector_count(text: &str) -> u64 {
    let windows = text.chars().count().div_ceil(CHUNK_SIZE);
    (windows as f64 * 1.2) as u64
}

/// Size of a text in megabytes (UTF-8 bytes / 1048576).
pub fn document_size_mb(text: &str) -> f64 {
    bytes_to_mb(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = TextChunker::default().split("Hello world.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello world.");
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(TextChunker::default().split("").is_empty());
        assert!(TextChunker::default().split("   \n\n ").is_empty());
    }

    #[test]
    fn test_windows_overlap() {
        let text = "x".repeat(2500);
        let chunks = TextChunker::default().split(&text);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text.len(), 1000);
        assert_eq!(chunks[1].start, 800);
        assert_eq!(chunks[2].start, 1600);
    }

    #[test]
    fn test_prefers_paragraph_breaks() {
        let first = "a".repeat(700);
        let second = "b".repeat(700);
        let text = format!("{first}\n\n{second}");

        let chunks = TextChunker::default().split(&text);
        assert_eq!(chunks[0].text, first);
        assert!(chunks[1].text.ends_with('b'));
    }

    #[test]
    fn test_multibyte_text() {
        let text = "日本語のテキスト。".repeat(300);
        let chunks = TextChunker::default().split(&text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= CHUNK_SIZE));
    }

    #[test]
    fn test_estimate_vector_count() {
        assert_eq!(estimate_vector_count(""), 0);
        assert_eq!(estimate_vector_count("short"), 1);
        assert_eq!(estimate_vector_count(&"x".repeat(1000)), 1);
        assert_eq!(estimate_vector_count(&"x".repeat(2500)), 3);
        assert_eq!(estimate_vector_count(&"x".repeat(10_000)), 12);
    }

    #[test]
    fn test_document_size_mb() {
        assert_eq!(document_size_mb(&"x".repeat(1024 * 1024)), 1.0);
    }

    #[test]
    fn test_snippet() {
        assert_eq!(TextChunk::snippet("abc", 5), "abc");
        assert_eq!(TextChunk::snippet("abcdef", 3), "abc...");
    }
}
