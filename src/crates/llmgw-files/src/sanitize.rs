//! Sanitized filenames for userdata blobs: first 64 alnum characters of
//! the key, followed by `-` and an 8-hex-digit sha256 suffix.

use sha2::{Digest, Sha256};

/// Collapses `key` to a filesystem-safe stem, then appends an 8-hex-digit
/// hash of the *original* key so two keys that collapse to the same stem
/// never collide.
pub fn sanitize_key(key: &str) -> String {
    let cleaned: String = key
        .chars()
        .map(|c| if c.is_alphanumeric() || c == ' ' || c == '_' || c == '-' { c } else { '_' })
        .collect();
    let collapsed = collapse_runs(&cleaned);
    let trimmed = collapsed.trim_matches(|c: char| c == '_' || c.is_whitespace());
    let mut stem: String = trimmed.chars().take(64).collect();
    while stem.ends_with('_') || stem.ends_with('.') {
        stem.pop();
    }
    if stem.is_empty() {
        stem = "checkpoint".to_string();
    }

    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    let short_hash = digest.iter().take(4).map(|b| format!("{b:02x}")).collect::<String>();

    format!("{stem}-{short_hash}")
}

/// Collapses consecutive `_`/whitespace runs to a single `_`.
fn collapse_runs(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_was_sep = false;
    for c in s.chars() {
        let is_sep = c == '_' || c.is_whitespace();
        if is_sep {
            if !prev_was_sep {
                out.push('_');
            }
        } else {
            out.push(c);
        }
        prev_was_sep = is_sep;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_unsafe_characters() {
        let sanitized = sanitize_key("my/weird key!!");
        assert!(sanitized.starts_with("my_weird_key"));
        assert_eq!(sanitized.len(), "my_weird_key".len() + 1 + 8);
    }

    #[test]
    fn different_keys_get_different_hashes() {
        let a = sanitize_key("same-stem");
        let b = sanitize_key("same-stem!");
        // collapses to the same stem but the hash differs
        assert_ne!(a, b);
    }

    #[test]
    fn empty_key_falls_back_to_checkpoint() {
        let sanitized = sanitize_key("___");
        assert!(sanitized.starts_with("checkpoint-"));
    }
}
