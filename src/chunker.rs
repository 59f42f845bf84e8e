//! Content-aware text chunking.
//!
//! Splitting happens in two phases. First the text is recursively divided
//! along a prioritized separator chain (structural boundaries first, then
//! paragraphs, lines, words, and finally fixed-size windows) into pieces no
//! larger than the target size. Separators stay attached to the piece they
//! introduce, so the concatenation of all pieces reproduces the input
//! byte-for-byte. Second, adjacent pieces are greedily merged up to the
//! target size, carrying a configurable overlap of trailing context into
//! each following chunk.
//!
//! Three policies are provided:
//!
//! | policy   | boundaries preferred                        | overlap |
//! |----------|---------------------------------------------|---------|
//! | code     | class / function definitions, blank lines   | small   |
//! | markdown | headings, blank lines                       | normal  |
//! | generic  | paragraphs, lines, words                    | normal  |

use crate::config::ChunkingConfig;
use crate::models::CODE_EXTENSIONS;

pub const CODE_SEPARATORS: &[&str] = &[
    "\n\nclass ",
    "\n\ndef ",
    "\n\nfunction ",
    "\n\nfn ",
    "\n\n",
    "\n",
    " ",
    "",
];

pub const MARKDOWN_SEPARATORS: &[&str] =
    &["\n# ", "\n## ", "\n### ", "\n#### ", "\n\n", "\n", " ", ""];

pub const GENERIC_SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// Recursive splitter with a fixed separator chain.
#[derive(Debug, Clone)]
pub struct Splitter {
    target_size: usize,
    overlap: usize,
    separators: &'static [&'static str],
}

impl Splitter {
    pub fn new(target_size: usize, overlap: usize, separators: &'static [&'static str]) -> Self {
        Self {
            target_size: target_size.max(1),
            overlap,
            separators,
        }
    }

    /// Split `text` into chunks. Empty and whitespace-only input produces
    /// no chunks; otherwise every chunk is non-empty and no chunk exceeds
    /// the target size.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let mut pieces = Vec::new();
        collect_pieces(text, self.separators, self.target_size, &mut pieces);
        self.merge(pieces)
    }

    /// Greedily pack pieces into chunks of at most `target_size` bytes,
    /// seeding each new chunk with the tail of the previous one.
    fn merge(&self, pieces: Vec<&str>) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut buf = String::new();
        // Bytes of `buf` that are carried overlap rather than new content.
        let mut carry_len = 0usize;

        for piece in pieces {
            if !buf.is_empty()
                && buf.len() > carry_len
                && buf.len() + piece.len() > self.target_size
            {
                let chunk = std::mem::take(&mut buf);
                let mut carry = overlap_tail(&chunk, self.overlap);
                if carry.len() + piece.len() > self.target_size {
                    carry = overlap_tail(carry, self.target_size.saturating_sub(piece.len()));
                }
                buf.push_str(carry);
                carry_len = buf.len();
                chunks.push(chunk);
            }
            buf.push_str(piece);
        }
        if buf.len() > carry_len {
            chunks.push(buf);
        }
        chunks
    }
}

/// Divide `text` into pieces no larger than `max`, trying each separator in
/// order and falling back to fixed-size windows when none applies.
fn collect_pieces<'a>(text: &'a str, separators: &[&str], max: usize, out: &mut Vec<&'a str>) {
    if text.is_empty() {
        return;
    }
    if text.len() <= max {
        out.push(text);
        return;
    }
    let (sep, rest) = match separators.split_first() {
        Some(pair) => pair,
        None => {
            push_windows(text, max, out);
            return;
        }
    };
    if sep.is_empty() {
        push_windows(text, max, out);
        return;
    }
    if !text.contains(sep) {
        collect_pieces(text, rest, max, out);
        return;
    }
    for part in split_with_separator(text, sep) {
        if part.len() <= max {
            out.push(part);
        } else {
            collect_pieces(part, rest, max, out);
        }
    }
}

/// Split on `sep`, keeping each separator attached to the piece it starts.
/// Concatenating the result reproduces `text` exactly.
fn split_with_separator<'a>(text: &'a str, sep: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut prev = 0;
    for (idx, _) in text.match_indices(sep) {
        if idx > prev {
            parts.push(&text[prev..idx]);
            prev = idx;
        }
    }
    if prev < text.len() {
        parts.push(&text[prev..]);
    }
    parts
}

/// Fixed-size windows aligned to char boundaries. Last resort when no
/// separator fits; never drops bytes.
fn push_windows<'a>(text: &'a str, max: usize, out: &mut Vec<&'a str>) {
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + max).min(text.len());
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            // Single char wider than the window; emit it whole.
            end = start + 1;
            while end < text.len() && !text.is_char_boundary(end) {
                end += 1;
            }
        }
        out.push(&text[start..end]);
        start = end;
    }
}

/// Last `n` bytes of `s`, rounded forward to a char boundary.
fn overlap_tail(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    if s.len() <= n {
        return s;
    }
    let mut idx = s.len() - n;
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    &s[idx..]
}

/// Chunk document text with the policy selected by its file extension.
pub fn chunk_document(text: &str, file_type: &str, config: &ChunkingConfig) -> Vec<String> {
    let ext = file_type.to_lowercase();
    let splitter = if CODE_EXTENSIONS.contains(&ext.as_str()) {
        Splitter::new(config.chunk_size, config.code_overlap, CODE_SEPARATORS)
    } else if matches!(ext.as_str(), ".md" | ".rst") {
        Splitter::new(config.chunk_size, config.chunk_overlap, MARKDOWN_SEPARATORS)
    } else {
        Splitter::new(config.chunk_size, config.chunk_overlap, GENERIC_SEPARATORS)
    };
    splitter.split(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prose(words: usize) -> String {
        (0..words)
            .map(|i| format!("word{i}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Undo overlap carrying: append each chunk minus the prefix it shares
    /// with what has been rebuilt so far.
    fn reassemble(chunks: &[String], overlap: usize) -> String {
        let mut out = chunks[0].clone();
        for chunk in &chunks[1..] {
            let mut k = overlap.min(chunk.len()).min(out.len());
            loop {
                while k > 0 && !chunk.is_char_boundary(k) {
                    k -= 1;
                }
                if out.ends_with(&chunk[..k]) {
                    out.push_str(&chunk[k..]);
                    break;
                }
                k -= 1;
            }
        }
        out
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        let splitter = Splitter::new(100, 20, GENERIC_SEPARATORS);
        assert!(splitter.split("").is_empty());
        assert!(splitter.split("  \n\n \t ").is_empty());
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let splitter = Splitter::new(1000, 200, GENERIC_SEPARATORS);
        let chunks = splitter.split("hello world");
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn test_deterministic() {
        let text = prose(300);
        let splitter = Splitter::new(200, 40, GENERIC_SEPARATORS);
        assert_eq!(splitter.split(&text), splitter.split(&text));
    }

    #[test]
    fn test_size_bound_and_nonempty() {
        let text = prose(500);
        let splitter = Splitter::new(150, 30, GENERIC_SEPARATORS);
        let chunks = splitter.split(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(!chunk.is_empty());
            assert!(chunk.len() <= 150, "chunk of {} bytes", chunk.len());
        }
    }

    #[test]
    fn test_reconstruction_preserves_content() {
        let text = prose(400);
        let overlap = 40;
        let splitter = Splitter::new(180, overlap, GENERIC_SEPARATORS);
        let chunks = splitter.split(&text);
        assert_eq!(reassemble(&chunks, overlap), text);
    }

    #[test]
    fn test_no_overlap_concatenates_exactly() {
        let text = prose(400);
        let splitter = Splitter::new(180, 0, GENERIC_SEPARATORS);
        let chunks = splitter.split(&text);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_code_splits_at_definitions() {
        let mut text = String::from("import os\n");
        for i in 0..3 {
            text.push_str(&format!(
                "\n\ndef handler_{i}(request):\n    {}\n    return respond(request)",
                format!("value_{i} = compute_{i}(request)\n    ").repeat(8)
            ));
        }
        let splitter = Splitter::new(400, 0, CODE_SEPARATORS);
        let chunks = splitter.split(&text);
        assert!(chunks.len() >= 3);
        // Definition boundaries start new chunks with the keyword intact.
        assert!(chunks.iter().any(|c| c.starts_with("\n\ndef handler_")));
    }

    #[test]
    fn test_markdown_splits_at_headings() {
        let mut text = String::from("intro paragraph\n");
        for i in 0..4 {
            text.push_str(&format!("\n## Section {i}\n{}\n", prose(30)));
        }
        let splitter = Splitter::new(250, 0, MARKDOWN_SEPARATORS);
        let chunks = splitter.split(&text);
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().any(|c| c.starts_with("\n## Section")));
    }

    #[test]
    fn test_unbroken_text_is_windowed_without_loss() {
        let text = "x".repeat(950);
        let splitter = Splitter::new(100, 0, GENERIC_SEPARATORS);
        let chunks = splitter.split(&text);
        assert!(chunks.iter().all(|c| c.len() <= 100));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_multibyte_windows_respect_char_boundaries() {
        let text = "héllø wörld ".repeat(40);
        let splitter = Splitter::new(50, 0, GENERIC_SEPARATORS);
        let chunks = splitter.split(&text);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_chunk_document_selects_policy() {
        let config = ChunkingConfig::default();
        let text = prose(20);
        assert!(!chunk_document(&text, ".py", &config).is_empty());
        assert!(!chunk_document(&text, ".md", &config).is_empty());
        assert!(!chunk_document(&text, ".txt", &config).is_empty());
    }
}
