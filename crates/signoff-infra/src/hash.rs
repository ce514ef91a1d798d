//! SHA-256 hashing of API tokens.
//!
//! Implements the `TokenHasher` trait from `signoff-core` using the `sha2`
//! crate (RustCrypto ecosystem).

use sha2::{Digest, Sha256};

use signoff_core::service::hash::TokenHasher;

/// Lowercase hex SHA-256 digests.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256TokenHasher;

impl TokenHasher for Sha256TokenHasher {
    fn hash_token(&self, token: &str) -> String {
        format!("{:x}", Sha256::digest(token.as_bytes()))
    }
}
