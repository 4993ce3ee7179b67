/*!
 * Rotation over the pre-provisioned translation API keys.
 *
 * The cursor only moves forward: once a key has failed, every later
 * message starts from its successor. Concurrent claims share the cursor,
 * so advances use compare-and-swap and a claim that lost the race simply
 * picks up the key another claim already switched to.
 */

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::ConfigError;

/// Upper bound of keys a deployment may provision
pub const MAX_CREDENTIALS: usize = 4;

/// One API key together with its position in the rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Zero-based position
    pub index: usize,
    /// API key sent to the endpoint
    pub key: String,
}

impl Credential {
    /// One-based number, as the keys are numbered in the configuration
    pub fn number(&self) -> usize {
        self.index + 1
    }
}

/// Sticky cursor over the configured API keys
#[derive(Debug)]
pub struct CredentialRotation {
    keys: Vec<String>,
    cursor: AtomicUsize,
}

impl CredentialRotation {
    /// Build a rotation, rejecting an empty or oversized key list
    pub fn new(keys: Vec<String>) -> Result<Self, ConfigError> {
        if keys.is_empty() {
            return Err(ConfigError::Missing("translation API key"));
        }
        if keys.len() > MAX_CREDENTIALS {
            return Err(ConfigError::TooManyCredentials {
                count: keys.len(),
                max: MAX_CREDENTIALS,
            });
        }

        Ok(Self {
            keys,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Number of keys in the rotation
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always false, a rotation holds at least one key
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Current cursor position
    pub fn position(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Credential the next request should use
    pub fn current(&self) -> Credential {
        self.credential_at(self.position())
    }

    /// Advance past the credential at `failed_index`
    ///
    /// Returns the credential to retry with, or `None` when the cursor was
    /// already on the last key.
    pub fn advance_from(&self, failed_index: usize) -> Option<Credential> {
        let next = failed_index + 1;
        if next >= self.keys.len() {
            return None;
        }

        match self
            .cursor
            .compare_exchange(failed_index, next, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Some(self.credential_at(next)),
            // Another claim already moved the cursor past the failed key.
            Err(actual) if actual > failed_index => Some(self.credential_at(actual)),
            Err(_) => None,
        }
    }

    fn credential_at(&self, index: usize) -> Credential {
        Credential {
            index,
            key: self.keys[index].clone(),
        }
    }
}
