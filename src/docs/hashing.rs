//! Stable content hashing for chunks, etags, and section ids.

use sha2::{Digest, Sha256};

/// Hash of a chunk's content or of the compiled view (the etag).
///
/// Hex-encoded SHA-256 over the raw bytes; equal iff the contents are
/// byte-identical.
pub fn stable_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Stable section identifier derived from the heading title and its
/// position among same-titled headings. Regenerated on every sync, so ids
/// survive edits elsewhere in the document.
pub fn section_id(title: &str, position: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"\n");
    hasher.update(position.to_string().as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("sec-{}", &digest[..12])
}
