use std::time::Duration;

use awsrotkey_aws::iam::{AwsIdentityApi, AwsSettings};
use awsrotkey_core::{identity::IdentityApi, store::CredentialStore};
use awsrotkey_rotate::{RotationEvent, RotationRequest, Rotator};
use awsrotkey_storage::shared_credentials::SharedCredentialsFile;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::{cli::RotateArgs, config::Config};

/// Exit status for any failed rotation.
pub const ROTATION_FAILED: u8 = 42;

/// Fully merged rotation settings: flags/env first, then the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotateSettings {
    pub request: RotationRequest,
    pub region: Option<String>,
    pub timeout: Option<Duration>,
}

pub fn settings_from(args: RotateArgs, config: &Config) -> RotateSettings {
    RotateSettings {
        request: RotationRequest {
            profile: args
                .profile
                .or_else(|| config.profile.clone())
                .unwrap_or_default(),
            credentials_file: args
                .credentials_file
                .or_else(|| config.credentials_file.clone()),
            dry_run: args.dry,
        },
        region: args.region.or_else(|| config.region.clone()),
        timeout: args
            .timeout
            .or(config.timeout_secs)
            .map(Duration::from_secs),
    }
}

/// Rotate the configured profile against AWS and return the process exit status.
pub async fn run(args: RotateArgs, config: &Config) -> u8 {
    let settings = settings_from(args, config);

    let api = AwsIdentityApi::connect(AwsSettings {
        profile: settings.request.profile.clone(),
        region: settings.region.clone(),
        credentials_file: settings.request.credentials_file.clone(),
    })
    .await;
    let rotator = Rotator::new(api, SharedCredentialsFile::new());

    let cancel = CancellationToken::new();
    let triggers = spawn_cancel_triggers(cancel.clone(), settings.timeout);
    let status = execute(&rotator, &settings.request, &cancel).await;
    triggers.abort();
    status
}

/// Run one rotation, printing every step for the operator.
pub async fn execute<A: IdentityApi, S: CredentialStore>(
    rotator: &Rotator<A, S>,
    request: &RotationRequest,
    cancel: &CancellationToken,
) -> u8 {
    let observer = |event: &RotationEvent| println!("{event}");
    match rotator.rotate(request, &observer, cancel).await {
        Ok(_) => 0,
        Err(err) => {
            error!(error = %err, "rotation failed");
            eprintln!("{err}");
            ROTATION_FAILED
        }
    }
}

/// Cancel on Ctrl-C or when the timeout elapses. The rotator defers either
/// once a new key exists.
fn spawn_cancel_triggers(cancel: CancellationToken, timeout: Option<Duration>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let deadline = async {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => warn!("interrupt received, stopping at the next safe point"),
            _ = deadline => warn!(?timeout, "timeout reached, stopping at the next safe point"),
        }
        cancel.cancel();
    })
}
