//! Text digests used for passkey proofs.

use sha2::{Digest as _, Sha256};

/// A one-way text digest producing lowercase hex.
///
/// Implemented for any `Fn(&str) -> String`, so tests can inject a trivial
/// digest.
pub trait Digest: Send + Sync {
    /// Hashes `text`.
    fn hash(&self, text: &str) -> String;
}

impl<F> Digest for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn hash(&self, text: &str) -> String {
        self(text)
    }
}

/// SHA-256 digest.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Digest;

impl Digest for Sha256Digest {
    fn hash(&self, text: &str) -> String {
        to_hex(&Sha256::digest(text.as_bytes()))
    }
}

/// Encodes bytes as lowercase hex.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// `hash(passkey + nonce)`
pub fn proof(digest: &dyn Digest, passkey: &str, nonce: &str) -> String {
    digest.hash(&format!("{}{}", passkey, nonce))
}

/// `hash(hash(passkey + next_nonce))`
pub fn client_nonce(digest: &dyn Digest, passkey: &str, next_nonce: &str) -> String {
    digest.hash(&digest.hash(&format!("{}{}", passkey, next_nonce)))
}
