//! TokenHasher trait for API token digests.
//!
//! Defined in signoff-core so the directory service can hash tokens without
//! coupling to a specific algorithm. The `Sha256TokenHasher` adapter lives
//! in signoff-infra.

pub trait TokenHasher: Send + Sync {
    /// Hex-encoded digest of a raw token.
    fn hash_token(&self, token: &str) -> String;
}
