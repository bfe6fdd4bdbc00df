use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use thiserror::Error;

use crate::keys::KeyPair;

/// Errors produced while reading or rewriting a credentials profile.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProfileStoreError {
    /// The backing file could not be read or written.
    #[error("cannot access credentials file {path}: {reason}")]
    Io { path: String, reason: String },
    /// No section header matches the profile.
    #[error("profile [{profile}] not found in {path}")]
    ProfileNotFound { profile: String, path: String },
    /// The profile section lacks one of the key entries.
    #[error("profile [{profile}] in {path} has no {key} entry")]
    MissingKey {
        profile: String,
        path: String,
        key: String,
    },
    /// The header matcher for the profile could not be built.
    #[error("cannot build matcher for profile [{profile}]: {reason}")]
    Pattern { profile: String, reason: String },
}

/// Where the key pair of a named profile lives (the shared credentials file in production).
pub trait ProfileStore: Send + Sync {
    /// Human-readable location used in logs and error messages.
    fn location(&self) -> String;

    /// Read the key pair currently stored for `profile`.
    fn read_key_pair(&self, profile: &str) -> Result<KeyPair, ProfileStoreError>;

    /// Replace the key pair of `profile`, leaving everything else untouched.
    fn write_key_pair(&self, profile: &str, key_pair: &KeyPair) -> Result<(), ProfileStoreError>;
}

/// Map-backed profile store for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryProfileStore {
    inner: Arc<Mutex<MemoryProfiles>>,
}

#[derive(Debug, Default)]
struct MemoryProfiles {
    profiles: BTreeMap<String, KeyPair>,
    fail_writes: bool,
}

const MEMORY_LOCATION: &str = "memory";

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(self, profile: impl Into<String>, key_pair: KeyPair) -> Self {
        if let Ok(mut state) = self.inner.lock() {
            state.profiles.insert(profile.into(), key_pair);
        }
        self
    }

    /// Make every subsequent write fail with an I/O error.
    pub fn fail_writes(&self) {
        if let Ok(mut state) = self.inner.lock() {
            state.fail_writes = true;
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryProfiles>, ProfileStoreError> {
        self.inner.lock().map_err(|err| ProfileStoreError::Io {
            path: MEMORY_LOCATION.to_string(),
            reason: format!("lock poisoned: {err}"),
        })
    }
}

impl ProfileStore for InMemoryProfileStore {
    fn location(&self) -> String {
        MEMORY_LOCATION.to_string()
    }

    fn read_key_pair(&self, profile: &str) -> Result<KeyPair, ProfileStoreError> {
        let state = self.lock()?;
        state
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| ProfileStoreError::ProfileNotFound {
                profile: profile.to_string(),
                path: MEMORY_LOCATION.to_string(),
            })
    }

    fn write_key_pair(&self, profile: &str, key_pair: &KeyPair) -> Result<(), ProfileStoreError> {
        let mut state = self.lock()?;
        if state.fail_writes {
            return Err(ProfileStoreError::Io {
                path: MEMORY_LOCATION.to_string(),
                reason: "injected write failure".to_string(),
            });
        }
        let slot = state
            .profiles
            .get_mut(profile)
            .ok_or_else(|| ProfileStoreError::ProfileNotFound {
                profile: profile.to_string(),
                path: MEMORY_LOCATION.to_string(),
            })?;
        *slot = key_pair.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_back_written_pair() {
        let store = InMemoryProfileStore::new().with_profile("dev", KeyPair::new("OLD", "OLDSECRET"));
        store
            .write_key_pair("dev", &KeyPair::new("NEW", "NEWSECRET"))
            .expect("write");
        assert_eq!(
            store.read_key_pair("dev").expect("read"),
            KeyPair::new("NEW", "NEWSECRET")
        );
    }

    #[test]
    fn unknown_profile_is_not_found() {
        let store = InMemoryProfileStore::new();
        let err = store.read_key_pair("ghost").expect_err("missing");
        assert!(matches!(err, ProfileStoreError::ProfileNotFound { .. }));
        let err = store
            .write_key_pair("ghost", &KeyPair::new("A", "B"))
            .expect_err("missing");
        assert!(matches!(err, ProfileStoreError::ProfileNotFound { .. }));
    }
}
