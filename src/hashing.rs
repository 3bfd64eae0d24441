//! Content hashes in the Control Plane's `sha256:<hex>` format.
//!
//! A hash's signing payload is the UTF-8 encoding of the whole
//! `sha256:<hex>` string. [`digest_bytes`] recovers the raw 32-byte digest
//! for verification tooling only.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Prefix carried by every content hash.
pub const HASH_PREFIX: &str = "sha256:";

/// Lowercase hex SHA-256 of `content`'s UTF-8 bytes.
#[must_use]
pub fn sha256_hex(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

/// `sha256:` + lowercase hex of `content`.
#[must_use]
pub fn content_hash(content: &str) -> String {
    format!("{HASH_PREFIX}{}", sha256_hex(content))
}

/// Bytes that get signed for a content hash.
#[must_use]
pub fn signing_payload(hash: &str) -> Vec<u8> {
    hash.as_bytes().to_vec()
}

/// Decode the raw digest from a `sha256:<hex>` string.
///
/// Returns `None` unless the input has the prefix followed by exactly 64
/// hex digits.
#[must_use]
pub fn digest_bytes(hash: &str) -> Option<[u8; 32]> {
    let hex = hash.strip_prefix(HASH_PREFIX)?;
    if hex.len() != 64 {
        return None;
    }
    let mut out = [0u8; 32];
    for (i, byte) in out.iter_mut().enumerate() {
        let pair = hex.get(i * 2..i * 2 + 2)?;
        *byte = u8::from_str_radix(pair, 16).ok()?;
    }
    Some(out)
}

/// Hashes submitted with a task result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentHashes {
    pub text_hash: String,
    pub headings_hash: String,
}

impl ContentHashes {
    /// Hash the cleaned text and the `|`-joined headings.
    #[must_use]
    pub fn compute(text: &str, headings: &[String]) -> Self {
        Self {
            text_hash: content_hash(text),
            headings_hash: content_hash(&headings.join("|")),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn empty_string_hash() {
        assert_eq!(
            content_hash(""),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn known_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn headings_are_pipe_joined() {
        let headings = vec!["One".to_owned(), "Two".to_owned()];
        let hashes = ContentHashes::compute("body", &headings);
        assert_eq!(hashes.headings_hash, content_hash("One|Two"));
        assert_eq!(hashes.text_hash, content_hash("body"));
    }

    #[test]
    fn signing_payload_is_the_full_string() {
        let hash = content_hash("abc");
        assert_eq!(signing_payload(&hash), hash.as_bytes());
        assert!(signing_payload(&hash).starts_with(b"sha256:"));
    }

    #[test]
    fn digest_bytes_round_trips_hex() {
        let hash = content_hash("abc");
        let bytes = digest_bytes(&hash).unwrap();
        assert_eq!(bytes[0], 0xba);
        assert_eq!(bytes[31], 0xad);
    }

    #[test]
    fn digest_bytes_rejects_malformed_input() {
        assert!(digest_bytes("md5:abcd").is_none());
        assert!(digest_bytes("sha256:abcd").is_none());
        assert!(digest_bytes(&format!("sha256:{}", "zz".repeat(32))).is_none());
    }
}
