use sha2::{Digest, Sha256};

/// Lowercase, collapse runs of whitespace to a single space, trim ends.
/// Two uploads whose normalized content agrees are the same logical
/// document regardless of surface formatting differences.
pub fn normalize_content(content: &str) -> String {
    let lowered = content.to_lowercase();
    let mut normalized = String::with_capacity(lowered.len());
    let mut last_was_space = false;
    for ch in lowered.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                normalized.push(' ');
            }
            last_was_space = true;
        } else {
            normalized.push(ch);
            last_was_space = false;
        }
    }
    normalized.trim().to_string()
}

pub fn content_hash(content: &str) -> String {
    let normalized = normalize_content(content);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn verify_content_hash(content: &str, expected: &str) -> bool {
    content_hash(content) == expected
}

/// Frequency/cache keys are `(document_id, sha256(lowercased question))`.
pub fn question_key(question: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(question.to_lowercase().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_collapses_whitespace_and_case() {
        assert_eq!(normalize_content("  Hello   World\n\n"), "hello world");
    }

    #[test]
    fn identical_normalized_content_hashes_equal() {
        let a = content_hash("Hello   World");
        let b = content_hash("hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn differing_content_hashes_differ() {
        assert_ne!(content_hash("Hello"), content_hash("World"));
    }
}
