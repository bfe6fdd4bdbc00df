use std::path::Path;

use color_eyre::{eyre::WrapErr, Result};
use keyrotate_aws::AwsKeyService;
use keyrotate_core::{
    keys::AccessKeyService,
    profile::ProfileStore,
    rotation::{KeyRotator, RotationError, RotationReport},
};
use keyrotate_credentials::CredentialsFile;
use tracing::info;

use crate::config::Settings;

/// Rotate the configured profile against AWS.
pub async fn run(settings: &Settings) -> Result<RotationReport> {
    let store = CredentialsFile::new(&settings.credential_file);
    info!(
        profile = %settings.profile,
        path = %settings.credential_file.display(),
        "loading current credentials"
    );
    let current = store
        .read_key_pair(&settings.profile)
        .wrap_err_with(|| context(settings))?;
    let service = AwsKeyService::connect(&settings.region, &current).await;
    rotate_with(service, store, settings).await
}

/// Run a rotation with the given collaborators, printing recovery steps when
/// a failure leaves keys that need manual attention.
pub async fn rotate_with<S, P>(service: S, store: P, settings: &Settings) -> Result<RotationReport>
where
    S: AccessKeyService,
    P: ProfileStore,
{
    let rotator = KeyRotator::new(service, store);
    match rotator.rotate(&settings.profile).await {
        Ok(report) => Ok(report),
        Err(err) => {
            if let Some(hint) = recovery_hint(&err, &settings.credential_file) {
                eprintln!("{hint}");
            }
            Err(err).wrap_err_with(|| context(settings))
        }
    }
}

fn context(settings: &Settings) -> String {
    format!(
        "rotating profile [{}] in {}",
        settings.profile,
        settings.credential_file.display()
    )
}

/// Operator instructions for failures that leave a live key behind.
pub fn recovery_hint(err: &RotationError, credential_file: &Path) -> Option<String> {
    match err {
        RotationError::WriteFailed {
            profile,
            old_access_key_id,
            new_key,
            ..
        } => Some(format!(
            "The new access key could not be saved and is shown only once. \
             Store it in profile [{profile}] by hand:\n\
             aws_access_key_id = {}\n\
             aws_secret_access_key = {}\n\
             The old key {old_access_key_id} is still active.",
            new_key.access_key_id, new_key.secret_access_key
        )),
        RotationError::DeleteFailed {
            profile,
            old_access_key_id,
            ..
        } => Some(format!(
            "The profile uses the new key, but the old key is still active. Remove it with:\n\
             AWS_SHARED_CREDENTIALS_FILE={} aws iam delete-access-key --profile {profile} --access-key-id {old_access_key_id}",
            credential_file.display()
        )),
        _ => None,
    }
}

/// One-line success message.
pub fn summary(report: &RotationReport) -> String {
    let user = report.user_name.as_deref().unwrap_or("caller");
    format!(
        "Rotated profile [{}] for {user}: {} -> {}",
        report.profile, report.old_access_key_id, report.new_access_key_id
    )
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf};

    use keyrotate_core::keys::{
        InMemoryAccessKeyService, KeyPair, RemoteError, RemoteErrorKind, ServiceCall,
    };
    use keyrotate_core::profile::ProfileStoreError;

    use super::*;

    const CREDENTIALS: &str =
        "[default]\naws_access_key_id = OLD\naws_secret_access_key = OLDSECRET\n";

    fn settings(path: PathBuf) -> Settings {
        Settings {
            profile: "default".into(),
            region: "eu-central-1".into(),
            credential_file: path,
        }
    }

    #[tokio::test]
    async fn rotates_file_with_memory_service() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("credentials");
        fs::write(&path, CREDENTIALS).expect("seed");
        let service = InMemoryAccessKeyService::new("alice", ["OLD"]);

        let report = rotate_with(service.clone(), CredentialsFile::new(&path), &settings(path.clone()))
            .await
            .expect("rotate");

        let expected = format!(
            "[default]\naws_access_key_id = {}\naws_secret_access_key = memory-secret-1\n",
            report.new_access_key_id
        );
        assert_eq!(fs::read_to_string(&path).expect("read"), expected);
        assert_eq!(service.active_keys(), vec![report.new_access_key_id.clone()]);
        assert_eq!(
            summary(&report),
            format!("Rotated profile [default] for alice: OLD -> {}", report.new_access_key_id)
        );
    }

    #[tokio::test]
    async fn failure_carries_path_and_profile_context() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("credentials");
        fs::write(&path, CREDENTIALS).expect("seed");
        let service = InMemoryAccessKeyService::new("alice", ["OLD"]);
        service.fail_on(ServiceCall::CallerIdentity, RemoteErrorKind::Authorization);

        let err = rotate_with(service, CredentialsFile::new(&path), &settings(path.clone()))
            .await
            .expect_err("identity fails");
        let rendered = format!("{err:#}");
        assert!(rendered.contains("rotating profile [default]"));
        assert!(rendered.contains("authorization"));
        assert_eq!(fs::read_to_string(&path).expect("read"), CREDENTIALS);
    }

    #[test]
    fn write_failure_hint_shows_new_key() {
        let err = RotationError::WriteFailed {
            profile: "default".into(),
            old_access_key_id: "OLD".into(),
            new_key: KeyPair::new("NEWID", "NEWSECRET"),
            source: ProfileStoreError::Io {
                path: "creds".into(),
                reason: "disk full".into(),
            },
        };
        let hint = recovery_hint(&err, Path::new("creds")).expect("hint");
        assert!(hint.contains("aws_access_key_id = NEWID"));
        assert!(hint.contains("aws_secret_access_key = NEWSECRET"));
        assert!(hint.contains("OLD"));
    }

    #[test]
    fn delete_failure_hint_names_old_key() {
        let err = RotationError::DeleteFailed {
            profile: "prod".into(),
            old_access_key_id: "OLD".into(),
            new_access_key_id: "NEWID".into(),
            source: RemoteError::new("iam:DeleteAccessKey", RemoteErrorKind::Transient, "timeout"),
        };
        let hint = recovery_hint(&err, Path::new("/srv/aws/credentials")).expect("hint");
        assert!(hint.contains("--profile prod --access-key-id OLD"));
        assert!(hint.contains("AWS_SHARED_CREDENTIALS_FILE=/srv/aws/credentials"));
    }

    #[test]
    fn early_failures_need_no_hint() {
        let err = RotationError::Store(ProfileStoreError::ProfileNotFound {
            profile: "default".into(),
            path: "creds".into(),
        });
        assert_eq!(recovery_hint(&err, Path::new("creds")), None);
    }
}
