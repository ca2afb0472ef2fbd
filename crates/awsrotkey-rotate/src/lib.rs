//! Access key rotation for a single profile.
//!
//! The order of remote calls is what keeps the profile usable throughout:
//! extra keys go first so the provider's two-key cap never blocks creation,
//! and the current key is only deleted after its replacement is on disk.

pub mod error;
pub mod events;

use std::{future::Future, path::PathBuf, sync::Arc};

use awsrotkey_core::{
    identity::IdentityApi,
    profile::{Credential, Profile},
    store::CredentialStore,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

pub use error::{RotationError, RotationStep};
pub use events::{RecordingObserver, RotationEvent, RotationObserver};

/// Input for one rotation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationRequest {
    pub profile: String,
    /// Overrides `~/.aws/credentials`.
    pub credentials_file: Option<PathBuf>,
    pub dry_run: bool,
}

impl RotationRequest {
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            credentials_file: None,
            dry_run: false,
        }
    }
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationOutcome {
    pub profile: Profile,
    pub caller_arn: String,
    pub old_key_id: String,
    /// `None` on a dry run.
    pub new_key_id: Option<String>,
    /// Extra keys removed before creation (empty on a dry run).
    pub deleted_keys: Vec<String>,
    pub dry_run: bool,
}

/// Drives a rotation against an identity API and a local credential store.
pub struct Rotator<A: IdentityApi, S: CredentialStore> {
    api: Arc<A>,
    store: Arc<S>,
}

impl<A: IdentityApi, S: CredentialStore> Rotator<A, S> {
    pub fn new(api: A, store: S) -> Self {
        Self {
            api: Arc::new(api),
            store: Arc::new(store),
        }
    }

    /// Rotate the profile's access key.
    ///
    /// `cancel` is honoured while waiting on remote calls before key creation
    /// and checked once more right before it. The create call itself is never
    /// raced: once it starts, persisting the new key and retiring the old one
    /// (or rolling the new one back) always runs to completion. Cancel through
    /// the token rather than by dropping this future.
    #[instrument(skip_all, fields(profile = %request.profile, dry_run = request.dry_run, api = self.api.name()))]
    pub async fn rotate(
        &self,
        request: &RotationRequest,
        observer: &dyn RotationObserver,
        cancel: &CancellationToken,
    ) -> Result<RotationOutcome, RotationError> {
        let profile = Profile::resolve(&request.profile, request.credentials_file.clone())?;

        let current = interruptible(
            cancel,
            RotationStep::ResolveCredentials,
            self.api.resolve_credentials(),
        )
        .await?
        .map_err(|source| RotationError::AuthResolution {
            profile: profile.name.clone(),
            source,
        })?;
        emit(
            observer,
            RotationEvent::UsingKey {
                key_id: current.access_key_id.clone(),
                profile: profile.name.clone(),
            },
        );

        let identity = interruptible(
            cancel,
            RotationStep::VerifyIdentity,
            self.api.caller_identity(),
        )
        .await?
        .map_err(|source| RotationError::IdentityVerification {
            key_id: current.access_key_id.clone(),
            source,
        })?;
        emit(
            observer,
            RotationEvent::CallerVerified {
                arn: identity.arn.clone(),
            },
        );

        let keys = interruptible(cancel, RotationStep::ListKeys, self.api.list_access_keys())
            .await?
            .map_err(|source| RotationError::KeyListing { source })?;
        emit(observer, RotationEvent::KeysListed { count: keys.len() });

        // Every key but the current one goes, whatever its age or status.
        let mut deleted_keys = Vec::new();
        for key in keys
            .iter()
            .filter(|k| k.access_key_id != current.access_key_id)
        {
            if request.dry_run {
                emit(
                    observer,
                    RotationEvent::WouldDeleteExtraKey {
                        key_id: key.access_key_id.clone(),
                    },
                );
                continue;
            }

            interruptible(
                cancel,
                RotationStep::DeleteExtraKeys,
                self.api.delete_access_key(&key.access_key_id),
            )
            .await?
            .map_err(|source| RotationError::KeyDeletion {
                key_id: key.access_key_id.clone(),
                superseded_by: None,
                source,
            })?;
            emit(
                observer,
                RotationEvent::ExtraKeyDeleted {
                    key_id: key.access_key_id.clone(),
                },
            );
            deleted_keys.push(key.access_key_id.clone());
        }

        if request.dry_run {
            emit(observer, RotationEvent::WouldCreateKey);
            emit(
                observer,
                RotationEvent::WouldUpdateFile {
                    path: profile.credentials_path.clone(),
                },
            );
            emit(
                observer,
                RotationEvent::WouldDeleteCurrentKey {
                    key_id: current.access_key_id.clone(),
                },
            );
            emit(observer, RotationEvent::Completed { dry_run: true });
            return Ok(RotationOutcome {
                profile,
                caller_arn: identity.arn,
                old_key_id: current.access_key_id,
                new_key_id: None,
                deleted_keys,
                dry_run: true,
            });
        }

        if cancel.is_cancelled() {
            warn!(step = %RotationStep::CreateKey, "rotation cancelled");
            return Err(RotationError::Cancelled {
                step: RotationStep::CreateKey,
            });
        }

        // The remote key may exist as soon as the request is sent: no
        // cancellation points from here on.
        let new = self
            .api
            .create_access_key()
            .await
            .map_err(|source| RotationError::KeyCreation { source })?;
        emit(
            observer,
            RotationEvent::KeyCreated {
                key_id: new.access_key_id.clone(),
            },
        );

        self.persist_or_roll_back(&profile, &current, &new, observer)
            .await?;

        self.api
            .delete_access_key(&current.access_key_id)
            .await
            .map_err(|source| RotationError::KeyDeletion {
                key_id: current.access_key_id.clone(),
                superseded_by: Some(new.access_key_id.clone()),
                source,
            })?;
        emit(
            observer,
            RotationEvent::OldKeyDeleted {
                key_id: current.access_key_id.clone(),
            },
        );
        emit(observer, RotationEvent::Completed { dry_run: false });

        Ok(RotationOutcome {
            profile,
            caller_arn: identity.arn,
            old_key_id: current.access_key_id,
            new_key_id: Some(new.access_key_id),
            deleted_keys,
            dry_run: false,
        })
    }

    /// Write the new key pair locally; on failure remove the new key remotely
    /// so no unreferenced key is left behind.
    async fn persist_or_roll_back(
        &self,
        profile: &Profile,
        current: &Credential,
        new: &Credential,
        observer: &dyn RotationObserver,
    ) -> Result<(), RotationError> {
        let source = match self
            .store
            .update_credentials(&profile.credentials_path, current, new)
            .await
        {
            Ok(()) => {
                emit(
                    observer,
                    RotationEvent::CredentialsWritten {
                        path: profile.credentials_path.clone(),
                    },
                );
                return Ok(());
            }
            Err(err) => err,
        };

        warn!(key = %new.access_key_id, error = %source, "credentials update failed, removing new key");
        match self.api.delete_access_key(&new.access_key_id).await {
            Ok(()) => {
                emit(
                    observer,
                    RotationEvent::RolledBackNewKey {
                        key_id: new.access_key_id.clone(),
                    },
                );
                Err(RotationError::Persistence {
                    key_id: new.access_key_id.clone(),
                    source,
                })
            }
            Err(rollback) => Err(RotationError::CompoundRollback {
                key_id: new.access_key_id.clone(),
                source,
                rollback,
            }),
        }
    }
}

fn emit(observer: &dyn RotationObserver, event: RotationEvent) {
    info!("{event}");
    observer.on_event(&event);
}

async fn interruptible<T>(
    cancel: &CancellationToken,
    step: RotationStep,
    call: impl Future<Output = T>,
) -> Result<T, RotationError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            warn!(%step, "rotation cancelled");
            Err(RotationError::Cancelled { step })
        }
        out = call => Ok(out),
    }
}
