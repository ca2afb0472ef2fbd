use std::fmt;

use awsrotkey_core::{identity::ApiError, profile::ProfileError, store::StoreError};
use thiserror::Error;

/// Steps at which a rotation can be cancelled, named for error and log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationStep {
    ResolveCredentials,
    VerifyIdentity,
    ListKeys,
    DeleteExtraKeys,
    CreateKey,
}

impl fmt::Display for RotationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            RotationStep::ResolveCredentials => "resolving credentials",
            RotationStep::VerifyIdentity => "verifying caller identity",
            RotationStep::ListKeys => "listing access keys",
            RotationStep::DeleteExtraKeys => "deleting extra access keys",
            RotationStep::CreateKey => "creating a new access key",
        };
        f.write_str(step)
    }
}

/// Everything that can stop a rotation. None of these are retried internally.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RotationError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ProfileError),

    #[error("unable to resolve credentials for profile '{profile}': {source}")]
    AuthResolution { profile: String, source: ApiError },

    #[error("access key {key_id} failed identity verification: {source}")]
    IdentityVerification { key_id: String, source: ApiError },

    #[error("failed to list access keys: {source}")]
    KeyListing { source: ApiError },

    /// `superseded_by` is set when the old key could not be retired after the
    /// new one was already persisted; the next run removes the leftover.
    #[error("failed to delete access key {key_id}{}: {source}", superseded_note(.superseded_by))]
    KeyDeletion {
        key_id: String,
        superseded_by: Option<String>,
        source: ApiError,
    },

    #[error("failed to create access key: {source}")]
    KeyCreation { source: ApiError },

    /// The credentials file could not be updated; the new key was removed again.
    #[error("failed to store new access key {key_id} (it was deleted again): {source}")]
    Persistence { key_id: String, source: StoreError },

    /// The credentials file could not be updated and the new key is still live.
    #[error(
        "failed to store new access key {key_id}: {source}; additionally failed to remove \
         the new key: {rollback}; delete {key_id} manually"
    )]
    CompoundRollback {
        key_id: String,
        source: StoreError,
        rollback: ApiError,
    },

    /// Only raised before the create call is sent, so no new key exists.
    #[error("rotation cancelled while {step}; no new access key was created")]
    Cancelled { step: RotationStep },
}

fn superseded_note(superseded_by: &Option<String>) -> String {
    match superseded_by {
        Some(new_key) => format!(
            " (new access key {new_key} is active and saved; rerun to remove the old key)"
        ),
        None => String::new(),
    }
}
