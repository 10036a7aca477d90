//! One-way hashing of recipient identifiers.
//!
//! Raw addresses must never reach the event log, the cooldown table or a log
//! line. Every component that needs to correlate sends to one recipient goes
//! through the same [`RecipientHasher`] so they all derive the same key.

use core::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of hex characters kept from the SHA-256 digest.
const HASH_LEN: usize = 16;

/// Hashing configuration
#[derive(Clone, Deserialize)]
pub struct HashingConfig {
    /// Salt mixed into every recipient hash.
    ///
    /// Changing it breaks correlation with previously recorded hashes.
    #[serde(default = "default_salt")]
    pub salt: String,
}

fn default_salt() -> String {
    "courier".to_string()
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            salt: default_salt(),
        }
    }
}

impl Debug for HashingConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("HashingConfig")
            .field("salt", &"<redacted>")
            .finish()
    }
}

/// Irreversible, salted identifier of a recipient.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipientHash(String);

impl RecipientHash {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RecipientHash {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

/// Salted SHA-256 hasher for recipient keys.
#[derive(Clone)]
pub struct RecipientHasher {
    salt: Arc<str>,
}

impl RecipientHasher {
    #[must_use]
    pub fn new(salt: &str) -> Self {
        Self {
            salt: Arc::from(salt),
        }
    }

    #[must_use]
    pub fn from_config(config: &HashingConfig) -> Self {
        Self::new(&config.salt)
    }

    /// Hash a recipient key (usually an email address).
    ///
    /// Keys are trimmed and lowercased first so that `A@X.com ` and `a@x.com`
    /// map to the same recipient.
    #[must_use]
    pub fn hash(&self, key: &str) -> RecipientHash {
        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update(b":");
        hasher.update(key.trim().to_lowercase().as_bytes());

        let mut digest = hex::encode(hasher.finalize());
        digest.truncate(HASH_LEN);
        RecipientHash(digest)
    }
}

impl Default for RecipientHasher {
    fn default() -> Self {
        Self::from_config(&HashingConfig::default())
    }
}

impl Debug for RecipientHasher {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("RecipientHasher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_and_normalised() {
        let hasher = RecipientHasher::new("pepper");

        let a = hasher.hash("a@x.com");
        let b = hasher.hash("  A@X.COM ");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), HASH_LEN);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_never_contains_the_address() {
        let hasher = RecipientHasher::default();
        let hash = hasher.hash("someone@example.com");

        assert!(!hash.as_str().contains("someone"));
        assert!(!hash.as_str().contains('@'));
    }

    #[test]
    fn test_salt_changes_hash() {
        let a = RecipientHasher::new("one").hash("a@x.com");
        let b = RecipientHasher::new("two").hash("a@x.com");
        assert_ne!(a, b);
    }

    #[test]
    fn test_debug_redacts_salt() {
        let config = HashingConfig {
            salt: "super-secret".to_string(),
        };
        assert!(!format!("{config:?}").contains("super-secret"));
        assert!(!format!("{:?}", RecipientHasher::from_config(&config)).contains("super-secret"));
    }
}
