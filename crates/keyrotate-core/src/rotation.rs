use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::{
    keys::{AccessKeyService, KeyPair, RemoteError},
    profile::{ProfileStore, ProfileStoreError},
};

/// Outcome of a successful rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationReport {
    pub profile: String,
    pub user_name: Option<String>,
    pub old_access_key_id: String,
    pub new_access_key_id: String,
}

/// Errors raised while rotating a profile. Variants after key creation say
/// which keys are live so nothing is lost.
#[derive(Debug, Error)]
pub enum RotationError {
    /// Reading the profile failed; no remote state was changed.
    #[error(transparent)]
    Store(#[from] ProfileStoreError),
    /// Identity lookup or key creation failed; the credentials file was not touched.
    #[error(transparent)]
    Remote(#[from] RemoteError),
    /// The service handed back the key that is already in the profile.
    #[error("new access key for profile [{profile}] equals the current key {access_key_id}")]
    KeyUnchanged {
        profile: String,
        access_key_id: String,
    },
    /// The new key exists remotely but could not be written; the old key is still active.
    #[error(
        "created access key {new_id} but could not update profile [{profile}]: {source}; old key {old_access_key_id} was left active",
        new_id = .new_key.access_key_id
    )]
    WriteFailed {
        profile: String,
        old_access_key_id: String,
        new_key: KeyPair,
        source: ProfileStoreError,
    },
    /// The profile holds the new key but the old key could not be deleted.
    #[error(
        "profile [{profile}] now uses {new_access_key_id} but deleting old key {old_access_key_id} failed: {source}"
    )]
    DeleteFailed {
        profile: String,
        old_access_key_id: String,
        new_access_key_id: String,
        source: RemoteError,
    },
}

/// Sequences a rotation: read profile, resolve caller, create key, rewrite profile, delete old key.
pub struct KeyRotator<S: AccessKeyService, P: ProfileStore> {
    service: S,
    store: P,
}

impl<S: AccessKeyService, P: ProfileStore> KeyRotator<S, P> {
    pub fn new(service: S, store: P) -> Self {
        Self { service, store }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn store(&self) -> &P {
        &self.store
    }

    /// Rotate the access key stored under `profile`.
    ///
    /// The old key is only deleted once the new one is persisted. A failed
    /// write returns [`RotationError::WriteFailed`] carrying the new key.
    #[instrument(skip(self), fields(service = self.service.name(), location = %self.store.location()))]
    pub async fn rotate(&self, profile: &str) -> Result<RotationReport, RotationError> {
        info!("searching for profile");
        let current = self.store.read_key_pair(profile)?;

        info!("resolving caller identity");
        let identity = self.service.caller_identity().await?;
        let user_name = identity.user_name.as_deref();

        info!(arn = %identity.arn, "obtaining new access key");
        let new_key = self.service.create_access_key(user_name).await?;
        if new_key.access_key_id == current.access_key_id {
            return Err(RotationError::KeyUnchanged {
                profile: profile.to_string(),
                access_key_id: current.access_key_id,
            });
        }

        info!(new_access_key_id = %new_key.access_key_id, "writing new credentials");
        if let Err(source) = self.store.write_key_pair(profile, &new_key) {
            error!(
                new_access_key_id = %new_key.access_key_id,
                "credentials write failed; old key left active"
            );
            return Err(RotationError::WriteFailed {
                profile: profile.to_string(),
                old_access_key_id: current.access_key_id,
                new_key,
                source,
            });
        }

        info!(old_access_key_id = %current.access_key_id, "deleting old access key");
        if let Err(source) = self
            .service
            .delete_access_key(user_name, &current.access_key_id)
            .await
        {
            warn!(old_access_key_id = %current.access_key_id, "old key is still active");
            return Err(RotationError::DeleteFailed {
                profile: profile.to_string(),
                old_access_key_id: current.access_key_id,
                new_access_key_id: new_key.access_key_id,
                source,
            });
        }

        info!("rotated credentials successfully");
        Ok(RotationReport {
            profile: profile.to_string(),
            user_name: identity.user_name,
            old_access_key_id: current.access_key_id,
            new_access_key_id: new_key.access_key_id,
        })
    }
}
