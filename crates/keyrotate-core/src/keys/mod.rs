use std::{
    fmt,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use thiserror::Error;

/// An IAM access key pair as written to a credentials profile.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub access_key_id: String,
    /// Never logged; `Debug` redacts it.
    pub secret_access_key: String,
}

impl KeyPair {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Identity of the principal whose credentials are being rotated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub arn: String,
    pub account: Option<String>,
    /// IAM user name, when the ARN names an IAM user. `None` means IAM calls act on the caller.
    pub user_name: Option<String>,
}

impl CallerIdentity {
    pub fn from_arn(arn: impl Into<String>, account: Option<String>) -> Self {
        let arn = arn.into();
        let user_name = user_name_from_arn(&arn);
        Self {
            arn,
            account,
            user_name,
        }
    }
}

/// Extract the user name from an IAM user ARN (`arn:aws:iam::123:user/path/alice` -> `alice`).
pub fn user_name_from_arn(arn: &str) -> Option<String> {
    let resource = arn.splitn(6, ':').nth(5)?;
    let path = resource.strip_prefix("user/")?;
    path.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Broad class of a remote failure, used to tell the operator whether retrying makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// Credentials rejected or caller lacks permission.
    Authorization,
    /// Timeouts, dispatch failures, throttling; safe to retry.
    Transient,
    /// Any other error returned by the service (limits, missing entities, ...).
    Service,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RemoteErrorKind::Authorization => "authorization",
            RemoteErrorKind::Transient => "transient",
            RemoteErrorKind::Service => "service",
        };
        f.write_str(label)
    }
}

/// Failure of a call against the key service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{operation} failed ({kind}): {message}")]
pub struct RemoteError {
    pub operation: &'static str,
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(operation: &'static str, kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
        }
    }
}

pub const GET_CALLER_IDENTITY: &str = "sts:GetCallerIdentity";
pub const CREATE_ACCESS_KEY: &str = "iam:CreateAccessKey";
pub const DELETE_ACCESS_KEY: &str = "iam:DeleteAccessKey";

/// Contract for the remote side of a rotation (IAM + STS in production, memory in tests).
#[async_trait]
pub trait AccessKeyService: Send + Sync {
    /// Short name used for logging.
    fn name(&self) -> &'static str;

    /// Resolve who the current credentials belong to.
    async fn caller_identity(&self) -> Result<CallerIdentity, RemoteError>;

    /// Create a new access key for `user_name` (or the caller when `None`).
    async fn create_access_key(&self, user_name: Option<&str>) -> Result<KeyPair, RemoteError>;

    /// Delete `access_key_id` belonging to `user_name` (or the caller when `None`).
    async fn delete_access_key(
        &self,
        user_name: Option<&str>,
        access_key_id: &str,
    ) -> Result<(), RemoteError>;
}

/// Remote calls that can be made to fail on an [`InMemoryAccessKeyService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceCall {
    CallerIdentity,
    CreateAccessKey,
    DeleteAccessKey,
}

/// IAM allows at most two access keys per user.
pub const MAX_KEYS_PER_USER: usize = 2;

/// In-memory stand-in for IAM/STS holding the keys of a single user.
#[derive(Debug, Clone)]
pub struct InMemoryAccessKeyService {
    inner: Arc<Mutex<MemoryIam>>,
}

#[derive(Debug)]
struct MemoryIam {
    identity: CallerIdentity,
    active_keys: Vec<String>,
    next_serial: u32,
    queued: Option<KeyPair>,
    failure: Option<(ServiceCall, RemoteErrorKind)>,
}

impl InMemoryAccessKeyService {
    /// A user `user_name` in account `123456789012` owning `existing_key_ids`.
    pub fn new<I, K>(user_name: &str, existing_key_ids: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let identity = CallerIdentity::from_arn(
            format!("arn:aws:iam::123456789012:user/{user_name}"),
            Some("123456789012".to_string()),
        );
        Self {
            inner: Arc::new(Mutex::new(MemoryIam {
                identity,
                active_keys: existing_key_ids.into_iter().map(Into::into).collect(),
                next_serial: 1,
                queued: None,
                failure: None,
            })),
        }
    }

    /// Make every subsequent `call` fail with `kind`.
    pub fn fail_on(&self, call: ServiceCall, kind: RemoteErrorKind) {
        if let Ok(mut state) = self.inner.lock() {
            state.failure = Some((call, kind));
        }
    }

    /// Hand out `key_pair` from the next `create_access_key` instead of a generated one.
    pub fn issue_next(&self, key_pair: KeyPair) {
        if let Ok(mut state) = self.inner.lock() {
            state.queued = Some(key_pair);
        }
    }

    /// Ids of the keys currently active for the user.
    pub fn active_keys(&self) -> Vec<String> {
        self.inner
            .lock()
            .map(|state| state.active_keys.clone())
            .unwrap_or_default()
    }

    fn state(
        &self,
        operation: &'static str,
    ) -> Result<std::sync::MutexGuard<'_, MemoryIam>, RemoteError> {
        self.inner.lock().map_err(|err| {
            RemoteError::new(
                operation,
                RemoteErrorKind::Service,
                format!("lock poisoned: {err}"),
            )
        })
    }
}

impl MemoryIam {
    fn check(&self, call: ServiceCall, operation: &'static str) -> Result<(), RemoteError> {
        match self.failure {
            Some((failing, kind)) if failing == call => {
                Err(RemoteError::new(operation, kind, "injected failure"))
            }
            _ => Ok(()),
        }
    }

    fn check_user(&self, user_name: Option<&str>, operation: &'static str) -> Result<(), RemoteError> {
        match user_name {
            Some(name) if self.identity.user_name.as_deref() != Some(name) => Err(RemoteError::new(
                operation,
                RemoteErrorKind::Service,
                format!("NoSuchEntity: user {name} cannot be found"),
            )),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl AccessKeyService for InMemoryAccessKeyService {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn caller_identity(&self) -> Result<CallerIdentity, RemoteError> {
        let state = self.state(GET_CALLER_IDENTITY)?;
        state.check(ServiceCall::CallerIdentity, GET_CALLER_IDENTITY)?;
        Ok(state.identity.clone())
    }

    async fn create_access_key(&self, user_name: Option<&str>) -> Result<KeyPair, RemoteError> {
        let mut state = self.state(CREATE_ACCESS_KEY)?;
        state.check(ServiceCall::CreateAccessKey, CREATE_ACCESS_KEY)?;
        state.check_user(user_name, CREATE_ACCESS_KEY)?;
        if state.active_keys.len() >= MAX_KEYS_PER_USER {
            return Err(RemoteError::new(
                CREATE_ACCESS_KEY,
                RemoteErrorKind::Service,
                format!("LimitExceeded: cannot exceed quota for AccessKeysPerUser: {MAX_KEYS_PER_USER}"),
            ));
        }

        let key = match state.queued.take() {
            Some(key) => key,
            None => {
                let serial = state.next_serial;
                state.next_serial += 1;
                KeyPair::new(
                    format!("AKIAMEMORY{serial:010}"),
                    format!("memory-secret-{serial}"),
                )
            }
        };
        if !state.active_keys.contains(&key.access_key_id) {
            state.active_keys.push(key.access_key_id.clone());
        }
        Ok(key)
    }

    async fn delete_access_key(
        &self,
        user_name: Option<&str>,
        access_key_id: &str,
    ) -> Result<(), RemoteError> {
        let mut state = self.state(DELETE_ACCESS_KEY)?;
        state.check(ServiceCall::DeleteAccessKey, DELETE_ACCESS_KEY)?;
        state.check_user(user_name, DELETE_ACCESS_KEY)?;
        let before = state.active_keys.len();
        state.active_keys.retain(|id| id != access_key_id);
        if state.active_keys.len() == before {
            return Err(RemoteError::new(
                DELETE_ACCESS_KEY,
                RemoteErrorKind::Service,
                format!("NoSuchEntity: access key {access_key_id} cannot be found"),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_name_is_last_path_segment() {
        assert_eq!(
            user_name_from_arn("arn:aws:iam::123456789012:user/ops/team/alice").as_deref(),
            Some("alice")
        );
        assert_eq!(
            user_name_from_arn("arn:aws:iam::123456789012:user/bob").as_deref(),
            Some("bob")
        );
    }

    #[test]
    fn non_user_arns_have_no_user_name() {
        assert_eq!(user_name_from_arn("arn:aws:iam::123456789012:root"), None);
        assert_eq!(
            user_name_from_arn("arn:aws:sts::123456789012:assumed-role/admin/session"),
            None
        );
        assert_eq!(user_name_from_arn("not-an-arn"), None);
    }

    #[test]
    fn debug_redacts_secret() {
        let pair = KeyPair::new("AKIAEXAMPLE", "super-secret");
        let rendered = format!("{pair:?}");
        assert!(rendered.contains("AKIAEXAMPLE"));
        assert!(!rendered.contains("super-secret"));
    }

    #[tokio::test]
    async fn memory_service_enforces_key_limit() {
        let service = InMemoryAccessKeyService::new("alice", ["AKIAOLD1", "AKIAOLD2"]);
        let err = service
            .create_access_key(Some("alice"))
            .await
            .expect_err("third key should be rejected");
        assert_eq!(err.kind, RemoteErrorKind::Service);
        assert_eq!(err.operation, CREATE_ACCESS_KEY);
    }

    #[tokio::test]
    async fn memory_service_creates_and_deletes_keys() {
        let service = InMemoryAccessKeyService::new("alice", ["AKIAOLD"]);
        let identity = service.caller_identity().await.expect("identity");
        assert_eq!(identity.user_name.as_deref(), Some("alice"));

        let created = service
            .create_access_key(Some("alice"))
            .await
            .expect("create");
        assert_eq!(service.active_keys(), vec!["AKIAOLD".to_string(), created.access_key_id.clone()]);

        service
            .delete_access_key(Some("alice"), "AKIAOLD")
            .await
            .expect("delete");
        assert_eq!(service.active_keys(), vec![created.access_key_id]);

        let err = service
            .delete_access_key(Some("alice"), "AKIAOLD")
            .await
            .expect_err("second delete should fail");
        assert!(err.message.contains("NoSuchEntity"));
    }

    #[tokio::test]
    async fn injected_failure_is_reported_with_kind() {
        let service = InMemoryAccessKeyService::new("alice", ["AKIAOLD"]);
        service.fail_on(ServiceCall::CallerIdentity, RemoteErrorKind::Authorization);
        let err = service.caller_identity().await.expect_err("should fail");
        assert_eq!(err.kind, RemoteErrorKind::Authorization);
        assert_eq!(err.to_string(), "sts:GetCallerIdentity failed (authorization): injected failure");
    }
}
