//! Unique key generation for new entities.

use remdoc_client::{Digest, Sha256Digest};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

enum Source {
    Counter(AtomicU64),
    Random,
}

/// Mints collision-resistant keys.
///
/// The counter source produces `prefix + counter + millis`, the counter
/// starting at 1; the random source produces `prefix + uuid`. Either may be
/// passed through a digest.
pub struct UidGenerator {
    prefix: String,
    source: Source,
    digest: Option<Arc<dyn Digest>>,
}

impl UidGenerator {
    /// A counter generator with a prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            source: Source::Counter(AtomicU64::new(0)),
            digest: None,
        }
    }

    /// A counter generator whose keys are SHA-256 hex digests.
    pub fn hashed() -> Self {
        Self::new("").with_digest(Arc::new(Sha256Digest))
    }

    /// A generator using random v4 UUIDs.
    pub fn random(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            source: Source::Random,
            digest: None,
        }
    }

    /// Passes every key through `digest`.
    pub fn with_digest(mut self, digest: Arc<dyn Digest>) -> Self {
        self.digest = Some(digest);
        self
    }

    /// Returns the next key.
    pub fn next_key(&self) -> String {
        let raw = match &self.source {
            Source::Counter(counter) => {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                format!("{}{}{}", self.prefix, n, now_millis())
            }
            Source::Random => format!("{}{}", self.prefix, Uuid::new_v4().simple()),
        };
        match &self.digest {
            Some(digest) => digest.hash(&raw),
            None => raw,
        }
    }
}

impl Default for UidGenerator {
    fn default() -> Self {
        Self::hashed()
    }
}

impl fmt::Debug for UidGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            Source::Counter(counter) => format!("counter({})", counter.load(Ordering::SeqCst)),
            Source::Random => "random".to_string(),
        };
        f.debug_struct("UidGenerator")
            .field("prefix", &self.prefix)
            .field("source", &source)
            .field("hashed", &self.digest.is_some())
            .finish()
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0)
}
