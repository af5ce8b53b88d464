//! Approximate tokenizer shared by the chunker and the ingestion pipeline.
//!
//! No concrete embedder is pinned by this spec (the embedding/LLM provider
//! is a pluggable trait), so chunk boundaries are computed against a
//! whitespace/punctuation-approximate token count rather than a
//! vendor-specific BPE table. The 10% drift tolerance documented on the
//! chunker absorbs the gap against whatever tokenizer a real `Embedder`
//! implementation uses internally.

/// Split text into approximate token units: runs of alphanumerics count as
/// one token each, and each punctuation/symbol character counts as its own
/// token, mirroring how BPE tokenizers usually split on punctuation.
pub fn tokenize(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    let mut start = None;
    let char_indices: Vec<(usize, char)> = text.char_indices().collect();
    let _ = bytes;
    for (idx, (byte_offset, ch)) in char_indices.iter().enumerate() {
        if ch.is_alphanumeric() {
            if start.is_none() {
                start = Some(*byte_offset);
            }
        } else {
            if let Some(s) = start.take() {
                tokens.push(&text[s..*byte_offset]);
            }
            if !ch.is_whitespace() {
                let end = char_indices
                    .get(idx + 1)
                    .map(|(o, _)| *o)
                    .unwrap_or(text.len());
                tokens.push(&text[*byte_offset..end]);
            }
        }
        i = idx;
    }
    let _ = i;
    if let Some(s) = start {
        tokens.push(&text[s..]);
    }
    tokens
}

pub fn count_tokens(text: &str) -> usize {
    tokenize(text).len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_words_and_punctuation_separately() {
        assert_eq!(count_tokens("hello, world!"), 4); // hello , world !
    }

    #[test]
    fn empty_text_has_zero_tokens() {
        assert_eq!(count_tokens(""), 0);
        assert_eq!(count_tokens("   "), 0);
    }
}
