use std::path::PathBuf;

use async_trait::async_trait;
use aws_config::{
    profile::{
        profile_file::{ProfileFileKind, ProfileFiles},
        ProfileFileCredentialsProvider,
    },
    BehaviorVersion, Region,
};
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sdk_iam::{
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    types::{AccessKeyMetadata, StatusType},
};
use awsrotkey_core::{
    identity::{ApiError, CallerIdentity, IdentityApi, KeyRecord, KeyStatus},
    profile::Credential,
};
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

/// IAM is a global service; any region signs correctly when the profile has none.
const FALLBACK_REGION: &str = "us-east-1";

/// Connection settings for the AWS identity API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsSettings {
    pub profile: String,
    pub region: Option<String>,
    /// Shared credentials file to read the profile from instead of the SDK default.
    pub credentials_file: Option<PathBuf>,
}

impl AwsSettings {
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            region: None,
            credentials_file: None,
        }
    }
}

/// IAM/STS-backed identity API bound to one named profile.
pub struct AwsIdentityApi {
    iam: aws_sdk_iam::Client,
    sts: aws_sdk_sts::Client,
    credentials: SharedCredentialsProvider,
    settings: AwsSettings,
}

impl AwsIdentityApi {
    /// Build clients for the profile. No network traffic happens until the first call.
    pub async fn connect(settings: AwsSettings) -> Self {
        let profile_files = settings.credentials_file.as_ref().map(|path| {
            ProfileFiles::builder()
                .include_default_config_file(true)
                .with_file(ProfileFileKind::Credentials, path)
                .build()
        });

        let mut provider = ProfileFileCredentialsProvider::builder().profile_name(&settings.profile);
        if let Some(files) = &profile_files {
            provider = provider.profile_files(files.clone());
        }
        // Credentials always come from the profile, never from environment variables,
        // so the key being rotated is the one the credentials file holds.
        let credentials = SharedCredentialsProvider::new(provider.build());

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .profile_name(&settings.profile)
            .credentials_provider(credentials.clone());
        if let Some(files) = profile_files {
            loader = loader.profile_files(files);
        }
        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;

        let region = sdk_config
            .region()
            .cloned()
            .unwrap_or_else(|| Region::new(FALLBACK_REGION));
        debug!(profile = %settings.profile, %region, "initialized AWS clients");

        let iam = aws_sdk_iam::Client::from_conf(
            aws_sdk_iam::config::Builder::from(&sdk_config)
                .region(region.clone())
                .build(),
        );
        let sts = aws_sdk_sts::Client::from_conf(
            aws_sdk_sts::config::Builder::from(&sdk_config)
                .region(region)
                .build(),
        );

        Self {
            iam,
            sts,
            credentials,
            settings,
        }
    }
}

#[async_trait]
impl IdentityApi for AwsIdentityApi {
    fn name(&self) -> &'static str {
        "aws"
    }

    #[instrument(skip_all, fields(profile = %self.settings.profile))]
    async fn resolve_credentials(&self) -> Result<Credential, ApiError> {
        let creds = self
            .credentials
            .provide_credentials()
            .await
            .map_err(|err| ApiError::Other(DisplayErrorContext(&err).to_string()))?;
        Ok(Credential::new(
            creds.access_key_id(),
            creds.secret_access_key(),
        ))
    }

    #[instrument(skip_all, fields(profile = %self.settings.profile))]
    async fn caller_identity(&self) -> Result<CallerIdentity, ApiError> {
        let resp = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(api_error)?;
        Ok(CallerIdentity {
            arn: resp.arn().unwrap_or_default().to_string(),
            account: resp.account().map(str::to_string),
            user_id: resp.user_id().map(str::to_string),
        })
    }

    #[instrument(skip_all, fields(profile = %self.settings.profile))]
    async fn list_access_keys(&self) -> Result<Vec<KeyRecord>, ApiError> {
        let metadata: Result<Vec<AccessKeyMetadata>, _> = self
            .iam
            .list_access_keys()
            .into_paginator()
            .items()
            .send()
            .collect()
            .await;
        Ok(metadata
            .map_err(api_error)?
            .iter()
            .filter_map(key_record_from)
            .collect())
    }

    #[instrument(skip_all, fields(profile = %self.settings.profile))]
    async fn create_access_key(&self) -> Result<Credential, ApiError> {
        let resp = self
            .iam
            .create_access_key()
            .send()
            .await
            .map_err(api_error)?;
        let key = resp
            .access_key()
            .ok_or_else(|| ApiError::Other("CreateAccessKey returned no access key".into()))?;
        Ok(Credential::new(
            key.access_key_id(),
            key.secret_access_key(),
        ))
    }

    #[instrument(skip_all, fields(profile = %self.settings.profile, key = access_key_id))]
    async fn delete_access_key(&self, access_key_id: &str) -> Result<(), ApiError> {
        self.iam
            .delete_access_key()
            .access_key_id(access_key_id)
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }
}

fn key_record_from(meta: &AccessKeyMetadata) -> Option<KeyRecord> {
    let access_key_id = meta.access_key_id()?.to_string();
    let status = match meta.status() {
        Some(StatusType::Active) => KeyStatus::Active,
        Some(StatusType::Inactive) => KeyStatus::Inactive,
        Some(other) => KeyStatus::Other(other.as_str().to_string()),
        None => KeyStatus::Other("unknown".to_string()),
    };
    let created_at = meta
        .create_date()
        .and_then(|d| DateTime::<Utc>::from_timestamp(d.secs(), d.subsec_nanos()));
    Some(KeyRecord {
        access_key_id,
        status,
        created_at,
    })
}

fn api_error<E, R>(err: SdkError<E, R>) -> ApiError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => ApiError::Unavailable(message),
        _ => classify(err.code(), message),
    }
}

/// Map a service error code onto the error kinds the rotation reports.
fn classify(code: Option<&str>, message: String) -> ApiError {
    match code {
        Some(
            "AccessDenied"
            | "AccessDeniedException"
            | "InvalidClientTokenId"
            | "SignatureDoesNotMatch"
            | "ExpiredToken",
        ) => ApiError::AccessDenied(message),
        Some("LimitExceeded") => ApiError::LimitExceeded(message),
        Some("ServiceFailure" | "Throttling" | "RequestLimitExceeded") => {
            ApiError::Unavailable(message)
        }
        _ => ApiError::Other(message),
    }
}
