//! Outbound message splitting.
//!
//! Platforms cap message length; large texts are split preferring a
//! paragraph boundary, then a line boundary, then a word boundary, then a
//! forced cut at `max_len`. Readers reassemble by concatenation.

/// Split `text` into chunks of at most `max_len` bytes.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if max_len == 0 || text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut rest = text;
    while rest.len() > max_len {
        let window = crate::constants::truncate_safe(rest, max_len);
        let mut cut = find_boundary(window);
        if cut == 0 {
            // max_len smaller than the first char: emit that char whole
            // rather than looping forever.
            cut = rest.chars().next().map(char::len_utf8).unwrap_or(rest.len());
        }
        let (head, tail) = rest.split_at(cut);
        let head = head.trim_end();
        if !head.is_empty() {
            chunks.push(head.to_string());
        }
        rest = tail.trim_start();
    }
    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

/// Best split point within `window`: paragraph > line > word > forced end.
fn find_boundary(window: &str) -> usize {
    if let Some(idx) = window.rfind("\n\n") {
        if idx > 0 {
            return idx;
        }
    }
    if let Some(idx) = window.rfind('\n') {
        if idx > 0 {
            return idx;
        }
    }
    if let Some(idx) = window.rfind(' ') {
        if idx > 0 {
            return idx;
        }
    }
    window.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_one_chunk() {
        assert_eq!(split_message("hello", 100), vec!["hello"]);
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let text = format!("{}\n\n{}", "a".repeat(40), "b".repeat(40));
        let chunks = split_message(&text, 60);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "a".repeat(40));
        assert_eq!(chunks[1], "b".repeat(40));
    }

    #[test]
    fn test_falls_back_to_line_boundary() {
        let text = format!("{}\n{}", "a".repeat(40), "b".repeat(40));
        let chunks = split_message(&text, 60);
        assert_eq!(chunks, vec!["a".repeat(40), "b".repeat(40)]);
    }

    #[test]
    fn test_falls_back_to_word_boundary() {
        let text = format!("{} {}", "a".repeat(40), "b".repeat(40));
        let chunks = split_message(&text, 60);
        assert_eq!(chunks, vec!["a".repeat(40), "b".repeat(40)]);
    }

    #[test]
    fn test_forced_split_without_boundaries() {
        let text = "x".repeat(130);
        let chunks = split_message(&text, 60);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() <= 60));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_every_chunk_within_limit() {
        let text = "the quick brown fox jumps over the lazy dog. ".repeat(50);
        for chunk in split_message(&text, 100) {
            assert!(chunk.len() <= 100, "chunk too long: {}", chunk.len());
        }
    }
}
