use sha1::{Digest, Sha1};
use std::fmt::Write;

/// SHA-1 digest of `data` in binary form.
pub fn raw_hash(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    let hash = hasher.finalize();

    let mut result = [0u8; 20];
    result.copy_from_slice(&hash);
    result
}

/// Lowercase hex form of a digest.
pub fn hex(hash: &[u8; 20]) -> String {
    hex::encode(hash)
}

/// Percent-encode every byte as `%XX` with uppercase hex digits.
///
/// Unreserved characters are encoded too; trackers compare the query string
/// byte-for-byte with this form.
pub fn percent_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for b in bytes {
        // Writing to a String cannot fail.
        let _ = write!(out, "%{:02X}", b);
    }
    out
}
