//! Content fingerprinting for cache keys and de-duplication.

use std::fmt::Write as _;

use sha2::{Digest, Sha256};

/// Number of digest bytes kept — 128 bits is enough for cache keys.
const FINGERPRINT_BYTES: usize = 16;

/// Deterministic content hash of a blob: SHA-256 truncated to 128 bits,
/// rendered as lowercase hex. A function of the bytes only — filename,
/// MIME type, and timing never participate.
pub fn hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(FINGERPRINT_BYTES * 2);
    for byte in &digest[..FINGERPRINT_BYTES] {
        // infallible for String
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_identical_bytes() {
        let a = hash(b"2024.03.01 10:00 \xea\xb8\x89\xec\x97\xac 0 1,500,000");
        let b = hash(b"2024.03.01 10:00 \xea\xb8\x89\xec\x97\xac 0 1,500,000");
        assert_eq!(a, b);
    }

    #[test]
    fn different_bytes_different_hash() {
        assert_ne!(hash(b"statement-a"), hash(b"statement-b"));
    }

    #[test]
    fn renders_32_lowercase_hex_chars() {
        let h = hash(b"anything");
        assert_eq!(h.len(), 32);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn empty_input_hashes_cleanly() {
        // SHA-256 of the empty string, truncated to 16 bytes
        assert_eq!(hash(b""), "e3b0c44298fc1c149afbf4c8996fb924");
    }

    #[test]
    fn single_bit_flip_changes_hash() {
        let base = hash(&[0b0000_0000]);
        let flipped = hash(&[0b0000_0001]);
        assert_ne!(base, flipped);
    }
}
