//! Paragraph-boundary text chunker.
//!
//! Splits extracted document text into bounded-size context windows for
//! the answer engine. Splitting occurs on paragraph boundaries (`\n\n`)
//! to preserve semantic coherence within each chunk; a paragraph is never
//! broken apart, so a chunk may exceed the limit by at most one
//! paragraph's length.

/// Split text into chunks on paragraph boundaries, respecting `max_chars`.
/// Non-empty input always yields at least one chunk; when nothing fits
/// under the limit the first chunk is a `max_chars`-bounded prefix of the
/// input. Deterministic and pure.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        // +2 for the \n\n separator
        let would_be = if current.is_empty() {
            trimmed.len()
        } else {
            current.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(trimmed);
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    // Nothing accumulated (e.g. whitespace-only input): fall back to a
    // bounded prefix so non-empty input never produces zero chunks.
    if chunks.is_empty() && !text.is_empty() {
        chunks.push(text.chars().take(max_chars).collect());
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 3_000);
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn empty_text_no_chunks() {
        assert!(chunk_text("", 3_000).is_empty());
    }

    #[test]
    fn whitespace_text_yields_prefix_chunk() {
        let chunks = chunk_text("   \n\n   ", 3_000);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn paragraphs_under_limit_stay_together() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = chunk_text(text, 3_000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], text);
    }

    #[test]
    fn paragraphs_over_limit_split_at_boundaries() {
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let chunks = chunk_text(text, 30);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], "This is paragraph one.");
        assert_eq!(chunks[2], "This is paragraph three.");
    }

    #[test]
    fn concatenation_reconstructs_paragraph_content() {
        let paragraphs: Vec<String> = (0..20).map(|i| format!("Paragraph number {i}.")).collect();
        let text = paragraphs.join("\n\n");
        let chunks = chunk_text(&text, 50);

        let rebuilt: Vec<&str> = chunks
            .iter()
            .flat_map(|c| c.split("\n\n"))
            .collect();
        assert_eq!(rebuilt, paragraphs.iter().map(|p| p.as_str()).collect::<Vec<_>>());
    }

    #[test]
    fn oversized_paragraph_becomes_its_own_chunk() {
        let big = "x".repeat(200);
        let text = format!("small one\n\n{big}\n\nsmall two");
        let chunks = chunk_text(&text, 50);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1], big);
    }

    #[test]
    fn single_giant_blob_is_kept_whole() {
        // No paragraph boundary at all: the blob is the only paragraph and
        // is carried as one chunk rather than dropped.
        let blob = "y".repeat(500);
        let chunks = chunk_text(&blob, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], blob);
    }

    #[test]
    fn deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        assert_eq!(chunk_text(text, 12), chunk_text(text, 12));
    }
}
