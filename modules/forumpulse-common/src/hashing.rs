use sha2::{Digest, Sha256};

/// Salted SHA-256 of a username. Raw usernames are never persisted —
/// every stored record carries this hash instead.
pub fn hash_author(username: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(username.as_bytes());
    hex::encode(hasher.finalize())
}

/// SHA-256 of cleaned text, used for intra-batch dedup.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
