use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_iam::config::Credentials;
use keyrotate_core::keys::{
    AccessKeyService, CallerIdentity, KeyPair, RemoteError, RemoteErrorKind, CREATE_ACCESS_KEY,
    DELETE_ACCESS_KEY, GET_CALLER_IDENTITY,
};
use tracing::{debug, instrument};

use crate::errors::remote_error;

const PROVIDER_NAME: &str = "keyrotate-credentials-file";

/// `AccessKeyService` backed by the AWS SDK.
pub struct AwsKeyService {
    iam: aws_sdk_iam::Client,
    sts: aws_sdk_sts::Client,
}

impl AwsKeyService {
    /// Build clients that sign with `current`, the key pair about to be rotated.
    pub async fn connect(region: &str, current: &KeyPair) -> Self {
        let credentials = Credentials::new(
            current.access_key_id.clone(),
            current.secret_access_key.clone(),
            None,
            None,
            PROVIDER_NAME,
        );
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(credentials)
            .load()
            .await;
        debug!(region, access_key_id = %current.access_key_id, "aws clients configured");
        Self::from_conf(&config)
    }

    pub fn from_conf(config: &SdkConfig) -> Self {
        Self {
            iam: aws_sdk_iam::Client::new(config),
            sts: aws_sdk_sts::Client::new(config),
        }
    }
}

#[async_trait]
impl AccessKeyService for AwsKeyService {
    fn name(&self) -> &'static str {
        "aws"
    }

    #[instrument(skip_all)]
    async fn caller_identity(&self) -> Result<CallerIdentity, RemoteError> {
        let out = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| remote_error(GET_CALLER_IDENTITY, e))?;
        let arn = out.arn().ok_or_else(|| {
            RemoteError::new(
                GET_CALLER_IDENTITY,
                RemoteErrorKind::Service,
                "response is missing Arn",
            )
        })?;
        Ok(CallerIdentity::from_arn(
            arn,
            out.account().map(str::to_string),
        ))
    }

    #[instrument(skip(self))]
    async fn create_access_key(&self, user_name: Option<&str>) -> Result<KeyPair, RemoteError> {
        let out = self
            .iam
            .create_access_key()
            .set_user_name(user_name.map(str::to_string))
            .send()
            .await
            .map_err(|e| remote_error(CREATE_ACCESS_KEY, e))?;
        let key = out.access_key().ok_or_else(|| {
            RemoteError::new(
                CREATE_ACCESS_KEY,
                RemoteErrorKind::Service,
                "response is missing AccessKey",
            )
        })?;
        Ok(KeyPair::new(key.access_key_id(), key.secret_access_key()))
    }

    #[instrument(skip(self))]
    async fn delete_access_key(
        &self,
        user_name: Option<&str>,
        access_key_id: &str,
    ) -> Result<(), RemoteError> {
        self.iam
            .delete_access_key()
            .set_user_name(user_name.map(str::to_string))
            .access_key_id(access_key_id)
            .send()
            .await
            .map_err(|e| remote_error(DELETE_ACCESS_KEY, e))?;
        Ok(())
    }
}
