//! Content hashing
//!
//! SHA-256 hex digests are the canonical content hash across chunks,
//! signatures, and the change detector.

use sha2::{Digest, Sha256};

/// Hash arbitrary text to a lowercase hex digest
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex_encode(&hasher.finalize())
}

/// Hash the given line range (1-based, inclusive) of a source file
pub fn hash_lines(source: &str, start_line: u32, end_line: u32) -> String {
    let slice: Vec<&str> = source
        .lines()
        .skip(start_line.saturating_sub(1) as usize)
        .take((end_line.saturating_sub(start_line) + 1) as usize)
        .collect();
    hash_text(&slice.join("\n"))
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_stable() {
        assert_eq!(hash_text("abc"), hash_text("abc"));
        assert_ne!(hash_text("abc"), hash_text("abd"));
    }

    #[test]
    fn test_hash_lines_extracts_range() {
        let src = "a\nb\nc\nd\n";
        assert_eq!(hash_lines(src, 2, 3), hash_text("b\nc"));
    }

    #[test]
    fn test_hash_is_hex() {
        let h = hash_text("x");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
