use std::{
    fmt::{Debug, Formatter},
    path::PathBuf,
};

use thiserror::Error;
use tracing::debug;

/// Errors raised while resolving a profile before any remote call is made.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error("no profile given")]
    EmptyName,
    #[error("unable to determine home directory for the shared credentials file")]
    NoHomeDir,
}

/// A named identity configuration plus the credentials file that backs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub credentials_path: PathBuf,
}

impl Profile {
    /// Resolve a profile, defaulting the credentials file to `~/.aws/credentials`.
    /// An explicit `credentials_path` wins over the home directory lookup.
    pub fn resolve(
        name: &str,
        credentials_path: Option<PathBuf>,
    ) -> Result<Self, ProfileError> {
        if name.trim().is_empty() {
            return Err(ProfileError::EmptyName);
        }

        let credentials_path = match credentials_path {
            Some(path) => path,
            None => default_credentials_path()?,
        };
        debug!(profile = name, path = %credentials_path.display(), "resolved profile");

        Ok(Self {
            name: name.to_string(),
            credentials_path,
        })
    }
}

/// `~/.aws/credentials` for the current user.
pub fn default_credentials_path() -> Result<PathBuf, ProfileError> {
    let home = dirs::home_dir().ok_or(ProfileError::NoHomeDir)?;
    Ok(home.join(".aws").join("credentials"))
}

/// An access key id paired with its secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl Credential {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &redact(&self.secret_access_key))
            .finish()
    }
}

/// Never log secrets; keep only a short prefix for correlation.
fn redact(secret: &str) -> String {
    let prefix: String = secret.chars().take(3).collect();
    if secret.chars().count() <= 6 {
        "***".to_string()
    } else {
        format!("{prefix}***")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_profile_name() {
        let err = Profile::resolve("  ", None).expect_err("empty name must fail");
        assert_eq!(err, ProfileError::EmptyName);
    }

    #[test]
    fn explicit_path_wins() {
        let profile = Profile::resolve("work", Some(PathBuf::from("/tmp/creds")))
            .expect("resolve should succeed");
        assert_eq!(profile.name, "work");
        assert_eq!(profile.credentials_path, PathBuf::from("/tmp/creds"));
    }

    #[test]
    fn debug_output_redacts_secret() {
        let cred = Credential::new("AKIAEXAMPLE", "wJalrXUtnFEMI/K7MDENG");
        let rendered = format!("{cred:?}");
        assert!(rendered.contains("AKIAEXAMPLE"));
        assert!(rendered.contains("wJa***"));
        assert!(!rendered.contains("wJalrXUtnFEMI"));
    }
}
