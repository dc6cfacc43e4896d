//! Cache key derivation for request identities.

use sha2::{Digest, Sha256};

use crate::request::RequestIdentity;

/// Compute the cache key for a method and canonical URL.
pub fn compute_cache_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

/// Cache key for a request identity.
pub fn identity_key(identity: &RequestIdentity) -> String {
    compute_cache_key(identity.method(), identity.url().as_str())
}
