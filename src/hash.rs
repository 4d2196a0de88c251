//! Content hashing of compilable sub-tasks.
//!
//! Sub-tasks are keyed by a 64-bit rolling hash of their canonical text. The
//! hash is only a fast filter: [`Fingerprint`] keeps the canonical text next
//! to it so that two structurally different sub-tasks that happen to collide
//! never compare equal.

use crate::ir::SubTask;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

const MULTIPLIER: u64 = 100_000_007;

/// Fold `bytes` into a 64-bit key: `acc = acc * 100000007 + byte`, wrapping.
pub fn rolling_hash(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| {
        acc.wrapping_mul(MULTIPLIER).wrapping_add(b as u64)
    })
}

/// 64-bit content key of a sub-task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(pub u64);

impl ContentHash {
    /// Hash already-serialized canonical text.
    pub fn of_text(text: &str) -> Self {
        ContentHash(rolling_hash(text.as_bytes()))
    }

    /// Serialize `task` and hash its canonical text.
    pub fn of<T: SubTask + ?Sized>(task: &T) -> Self {
        Self::of_text(&task.canonical_text())
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Cache key: content hash plus the canonical text it was derived from.
///
/// `Hash` only feeds the 64-bit key to the hasher; `Eq` compares the key
/// first and falls back to the full text.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    hash: ContentHash,
    canonical: Arc<str>,
}

impl Fingerprint {
    pub fn of<T: SubTask + ?Sized>(task: &T) -> Self {
        Self::from_text(task.canonical_text())
    }

    pub fn from_text<S: Into<Arc<str>>>(text: S) -> Self {
        let canonical: Arc<str> = text.into();
        Self {
            hash: ContentHash::of_text(&canonical),
            canonical,
        }
    }

    pub fn content_hash(&self) -> ContentHash {
        self.hash
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// First line of the canonical text, for error messages.
    pub fn summary(&self) -> &str {
        self.canonical.lines().next().unwrap_or("")
    }

    #[cfg(test)]
    pub(crate) fn forged(hash: ContentHash, text: &str) -> Self {
        Self {
            hash,
            canonical: Arc::from(text),
        }
    }

    /// Same key, different program.
    pub fn collides_with(&self, other: &Fingerprint) -> bool {
        self.hash == other.hash && self.canonical != other.canonical
    }
}

impl PartialEq for Fingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && (Arc::ptr_eq(&self.canonical, &other.canonical) || self.canonical == other.canonical)
    }
}

impl Eq for Fingerprint {}

impl Hash for Fingerprint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_rolling_hash_matches_recurrence() {
        assert_eq!(rolling_hash(b""), 0);
        assert_eq!(rolling_hash(b"a"), 97);
        assert_eq!(rolling_hash(b"ab"), 97 * 100_000_007 + 98);
    }

    #[test]
    fn test_rolling_hash_wraps() {
        let long = vec![0xffu8; 4096];
        // must not panic in debug builds
        let _ = rolling_hash(&long);
    }

    #[test]
    fn test_content_hash_display() {
        assert_eq!(ContentHash(0xab).to_string(), "00000000000000ab");
    }

    #[test]
    fn test_fingerprint_equality_checks_text() {
        let a = Fingerprint::from_text("offload range_for 0..16");
        let b = Fingerprint::from_text("offload range_for 0..16");
        assert_eq!(a, b);

        let forged = Fingerprint {
            hash: a.content_hash(),
            canonical: Arc::from("offload serial"),
        };
        assert_ne!(a, forged);
        assert!(a.collides_with(&forged));

        let mut set = HashSet::new();
        set.insert(a.clone());
        set.insert(b);
        set.insert(forged);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_summary_is_first_line() {
        let fp = Fingerprint::from_text("offload struct_for\n  body");
        assert_eq!(fp.summary(), "offload struct_for");
    }
}
