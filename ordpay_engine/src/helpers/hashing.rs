use blake2::{Blake2b512, Digest};
use serde::Serialize;

/// A stable fingerprint of a request body, used to tell a genuine retry apart from a different request that reuses
/// an idempotency key.
pub fn request_fingerprint<T: Serialize>(request: &T) -> String {
    // serde_json only fails for maps with non-string keys, which our request types do not have
    let bytes = serde_json::to_vec(request).unwrap_or_default();
    let digest = Blake2b512::digest(&bytes);
    hex::encode(&digest[..32])
}
