// hasher.rs — SHA-256 hashing for the task event hash chain.
//
// Hashes are SHA-256, hex-encoded: a 64-character lowercase string.

use sha2::{Digest, Sha256};

/// Hash arbitrary bytes, returning a lowercase hex-encoded SHA-256 string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Hash a UTF-8 string (one serialized log line).
pub fn hash_str(s: &str) -> String {
    hash_bytes(s.as_bytes())
}
