//! Cache tag hashing
//!
//! Tags are indexed on the proxy by a short digest rather than their raw
//! text, which keeps the `Section-Cache-Tags` header compact and free of
//! characters that would need quoting. The digest must match the one the
//! origin emits: the first characters of the standard base64 encoding of
//! the tag's MD5 digest.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use md5::{Digest, Md5};

/// Number of base64 characters kept from each tag digest
pub const TAG_HASH_LENGTH: usize = 4;

/// Hash a single cache tag
pub fn cache_tag(tag: &str) -> String {
    let digest = Md5::digest(tag.as_bytes());
    let mut encoded = STANDARD.encode(digest);
    encoded.truncate(TAG_HASH_LENGTH);
    encoded
}

/// Hash a list of cache tags, preserving order
pub fn cache_tags<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    tags.iter().map(|tag| cache_tag(tag.as_ref())).collect()
}
