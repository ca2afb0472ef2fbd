use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::profile::Credential;

/// Errors surfaced by the remote identity API. Messages are kept verbatim.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The credential was rejected (disabled, deleted, or lacks permission).
    #[error("access denied: {0}")]
    AccessDenied(String),
    /// The service could not be reached or timed out.
    #[error("service unavailable: {0}")]
    Unavailable(String),
    /// A provider quota (such as the two-keys-per-user cap) was hit.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),
    #[error("{0}")]
    Other(String),
}

/// Lifecycle status of an access key as reported remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStatus {
    Active,
    Inactive,
    Other(String),
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyStatus::Active => f.write_str("active"),
            KeyStatus::Inactive => f.write_str("inactive"),
            KeyStatus::Other(status) => f.write_str(status),
        }
    }
}

/// An access key known to the remote API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    pub access_key_id: String,
    pub status: KeyStatus,
    pub created_at: Option<DateTime<Utc>>,
}

impl KeyRecord {
    pub fn active(access_key_id: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            status: KeyStatus::Active,
            created_at: None,
        }
    }
}

/// Identity the remote API associates with the current credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub arn: String,
    pub account: Option<String>,
    pub user_id: Option<String>,
}

/// Capability set the rotation needs from the cloud identity service.
/// Implementations are bound to a single profile.
#[async_trait]
pub trait IdentityApi: Send + Sync {
    /// Short name used for logging.
    fn name(&self) -> &'static str;

    /// Resolve the credential the profile currently authenticates with.
    async fn resolve_credentials(&self) -> Result<Credential, ApiError>;

    /// Confirm the current credential is accepted.
    async fn caller_identity(&self) -> Result<CallerIdentity, ApiError>;

    /// List every access key of the calling identity.
    async fn list_access_keys(&self) -> Result<Vec<KeyRecord>, ApiError>;

    /// Mint a new access key; the secret is only available in this response.
    async fn create_access_key(&self) -> Result<Credential, ApiError>;

    /// Delete an access key by id.
    async fn delete_access_key(&self, access_key_id: &str) -> Result<(), ApiError>;
}

/// Remote operations, used to inject failures into the in-memory double.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiOperation {
    ResolveCredentials,
    CallerIdentity,
    ListAccessKeys,
    CreateAccessKey,
    DeleteAccessKey,
}

/// A call observed by [`InMemoryIdentityApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    ResolveCredentials,
    CallerIdentity,
    ListAccessKeys,
    CreateAccessKey(String),
    DeleteAccessKey(String),
}

impl ApiCall {
    pub fn is_mutation(&self) -> bool {
        matches!(self, ApiCall::CreateAccessKey(_) | ApiCall::DeleteAccessKey(_))
    }
}

/// In-memory identity service for tests and offline smoke runs.
/// Mirrors the provider behavior that matters for rotation: a two-key cap,
/// keys addressed by id, secrets only returned on creation.
#[derive(Debug, Clone)]
pub struct InMemoryIdentityApi {
    inner: Arc<Mutex<InMemoryState>>,
}

#[derive(Debug)]
struct InMemoryState {
    current: Credential,
    arn: String,
    keys: Vec<KeyRecord>,
    key_limit: usize,
    pending: VecDeque<Credential>,
    issued: u32,
    failures: HashMap<ApiOperation, ApiError>,
    delete_failures: HashMap<String, ApiError>,
    calls: Vec<ApiCall>,
}

impl InMemoryIdentityApi {
    /// Service whose only key is `current`.
    pub fn new(current: Credential) -> Self {
        let keys = vec![KeyRecord::active(current.access_key_id.clone())];
        Self {
            inner: Arc::new(Mutex::new(InMemoryState {
                current,
                arn: "arn:aws:iam::123456789012:user/rotator".to_string(),
                keys,
                key_limit: 2,
                pending: VecDeque::new(),
                issued: 0,
                failures: HashMap::new(),
                delete_failures: HashMap::new(),
                calls: Vec::new(),
            })),
        }
    }

    /// Register an additional existing key (ignores the key cap, as leftovers may exceed it).
    pub fn with_key(self, access_key_id: impl Into<String>) -> Self {
        self.state().keys.push(KeyRecord::active(access_key_id));
        self
    }

    /// Queue the credential returned by the next `create_access_key`.
    pub fn with_next_key(self, credential: Credential) -> Self {
        self.state().pending.push_back(credential);
        self
    }

    /// Make every call of `operation` fail with `error`.
    pub fn fail(self, operation: ApiOperation, error: ApiError) -> Self {
        self.state().failures.insert(operation, error);
        self
    }

    /// Make deleting one specific key fail with `error`.
    pub fn fail_delete_of(self, access_key_id: impl Into<String>, error: ApiError) -> Self {
        self.state()
            .delete_failures
            .insert(access_key_id.into(), error);
        self
    }

    pub fn key_ids(&self) -> Vec<String> {
        self.state()
            .keys
            .iter()
            .map(|k| k.access_key_id.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.state().calls.clone()
    }

    pub fn mutations(&self) -> Vec<ApiCall> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, InMemoryState> {
        // A poisoned lock only happens after a panicking test; the state is still usable.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl InMemoryState {
    fn check(&self, operation: ApiOperation) -> Result<(), ApiError> {
        match self.failures.get(&operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn next_credential(&mut self) -> Credential {
        if let Some(next) = self.pending.pop_front() {
            return next;
        }
        self.issued += 1;
        Credential::new(
            format!("AKIAMEMORY{:010}", self.issued),
            format!("memory-secret-{:030}", self.issued),
        )
    }
}

#[async_trait]
impl IdentityApi for InMemoryIdentityApi {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn resolve_credentials(&self) -> Result<Credential, ApiError> {
        let mut state = self.state();
        state.calls.push(ApiCall::ResolveCredentials);
        state.check(ApiOperation::ResolveCredentials)?;
        Ok(state.current.clone())
    }

    async fn caller_identity(&self) -> Result<CallerIdentity, ApiError> {
        let mut state = self.state();
        state.calls.push(ApiCall::CallerIdentity);
        state.check(ApiOperation::CallerIdentity)?;
        let current_id = state.current.access_key_id.clone();
        if !state.keys.iter().any(|k| k.access_key_id == current_id) {
            return Err(ApiError::AccessDenied(format!(
                "the security token included in the request is invalid ({current_id})"
            )));
        }
        Ok(CallerIdentity {
            arn: state.arn.clone(),
            account: Some("123456789012".to_string()),
            user_id: Some("AIDAMEMORY".to_string()),
        })
    }

    async fn list_access_keys(&self) -> Result<Vec<KeyRecord>, ApiError> {
        let mut state = self.state();
        state.calls.push(ApiCall::ListAccessKeys);
        state.check(ApiOperation::ListAccessKeys)?;
        Ok(state.keys.clone())
    }

    async fn create_access_key(&self) -> Result<Credential, ApiError> {
        let mut state = self.state();
        state.check(ApiOperation::CreateAccessKey)?;
        if state.keys.len() >= state.key_limit {
            return Err(ApiError::LimitExceeded(format!(
                "cannot exceed quota for AccessKeysPerUser: {}",
                state.key_limit
            )));
        }
        let credential = state.next_credential();
        state
            .calls
            .push(ApiCall::CreateAccessKey(credential.access_key_id.clone()));
        state
            .keys
            .push(KeyRecord::active(credential.access_key_id.clone()));
        Ok(credential)
    }

    async fn delete_access_key(&self, access_key_id: &str) -> Result<(), ApiError> {
        let mut state = self.state();
        state.check(ApiOperation::DeleteAccessKey)?;
        if let Some(err) = state.delete_failures.get(access_key_id) {
            return Err(err.clone());
        }
        let before = state.keys.len();
        state.keys.retain(|k| k.access_key_id != access_key_id);
        if state.keys.len() == before {
            return Err(ApiError::Other(format!(
                "the access key with id {access_key_id} cannot be found"
            )));
        }
        state
            .calls
            .push(ApiCall::DeleteAccessKey(access_key_id.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current() -> Credential {
        Credential::new("AKIA_OLD", "secretOLD")
    }

    #[tokio::test]
    async fn create_respects_two_key_cap() {
        let api = InMemoryIdentityApi::new(current()).with_key("AKIA_EXTRA");
        let err = api
            .create_access_key()
            .await
            .expect_err("third key must be refused");
        assert!(matches!(err, ApiError::LimitExceeded(_)));
        assert!(api.mutations().is_empty());
    }

    #[tokio::test]
    async fn queued_keys_are_issued_in_order() {
        let api = InMemoryIdentityApi::new(current())
            .with_next_key(Credential::new("AKIA_NEW", "secretNEW"));
        let created = api.create_access_key().await.expect("create");
        assert_eq!(created, Credential::new("AKIA_NEW", "secretNEW"));
        assert_eq!(api.key_ids(), vec!["AKIA_OLD", "AKIA_NEW"]);
    }

    #[tokio::test]
    async fn delete_removes_key_and_is_recorded() {
        let api = InMemoryIdentityApi::new(current()).with_key("AKIA_EXTRA");
        api.delete_access_key("AKIA_EXTRA").await.expect("delete");
        assert_eq!(api.key_ids(), vec!["AKIA_OLD"]);
        assert_eq!(
            api.mutations(),
            vec![ApiCall::DeleteAccessKey("AKIA_EXTRA".into())]
        );

        let err = api
            .delete_access_key("AKIA_EXTRA")
            .await
            .expect_err("second delete should fail");
        assert!(matches!(err, ApiError::Other(_)));
    }

    #[tokio::test]
    async fn injected_failures_are_returned_verbatim() {
        let api = InMemoryIdentityApi::new(current()).fail(
            ApiOperation::CallerIdentity,
            ApiError::AccessDenied("key disabled".into()),
        );
        let err = api.caller_identity().await.expect_err("should fail");
        assert_eq!(err, ApiError::AccessDenied("key disabled".into()));
        assert_eq!(err.to_string(), "access denied: key disabled");
    }
}
