//! Password hashing collaborator.

use sha2::{Digest, Sha256};

/// Turns a plaintext password into the digest that gets persisted.
pub trait PasswordHash: Send + Sync {
    /// Hash the provided plaintext.
    fn hash(&self, plaintext: &str) -> String;
}

/// Hex-encoded SHA-256 digest.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hash;

impl PasswordHash for Sha256Hash {
    fn hash(&self, plaintext: &str) -> String {
        format!("{:x}", Sha256::digest(plaintext.as_bytes()))
    }
}
