use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use async_trait::async_trait;
use awsrotkey_core::{
    profile::Credential,
    store::{CredentialField, CredentialStore, StoreError},
};
use regex::{Captures, Regex};
use tempfile::NamedTempFile;
use tracing::{info, instrument};

const KEY_ID_FIELD: &str = "aws_access_key_id";
const SECRET_FIELD: &str = "aws_secret_access_key";

/// Patches the AWS shared credentials file (`~/.aws/credentials`).
/// Only the two assignment lines holding the old key pair are rewritten;
/// sections, comments and every other profile stay byte-for-byte the same.
#[derive(Debug, Default, Clone, Copy)]
pub struct SharedCredentialsFile;

impl SharedCredentialsFile {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CredentialStore for SharedCredentialsFile {
    #[instrument(skip_all, fields(path = %path.display(), old_key = %old.access_key_id))]
    async fn update_credentials(
        &self,
        path: &Path,
        old: &Credential,
        new: &Credential,
    ) -> Result<(), StoreError> {
        let contents = fs::read_to_string(path).map_err(|err| StoreError::Read {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

        let patched = patch_contents(&contents, old, new).map_err(|field| {
            StoreError::FieldNotFound {
                field,
                path: path.to_path_buf(),
            }
        })?;

        write_private(path, &patched)?;
        info!(new_key = %new.access_key_id, "wrote new key pair");
        Ok(())
    }
}

/// Replace the old key id and secret with the new ones.
/// The key id is checked first, so a stale file reports the id, not the secret.
pub fn patch_contents(
    contents: &str,
    old: &Credential,
    new: &Credential,
) -> Result<String, CredentialField> {
    let with_id = replace_field(
        contents,
        &KEY_ID_LINE,
        KEY_ID_FIELD,
        &old.access_key_id,
        &new.access_key_id,
    )
    .ok_or(CredentialField::KeyId)?;

    replace_field(
        &with_id,
        &SECRET_LINE,
        SECRET_FIELD,
        &old.secret_access_key,
        &new.secret_access_key,
    )
    .ok_or(CredentialField::Secret)
}

fn replace_field(
    contents: &str,
    line: &Regex,
    field: &str,
    old_value: &str,
    new_value: &str,
) -> Option<String> {
    let mut found = false;
    let replaced = line.replace_all(contents, |caps: &Captures<'_>| {
        if &caps["value"] == old_value {
            found = true;
            format!("{}{field} = {new_value}{}", &caps["indent"], &caps["tail"])
        } else {
            caps[0].to_string()
        }
    });
    found.then(|| replaced.into_owned())
}

static KEY_ID_LINE: LazyLock<Regex> = LazyLock::new(|| assignment_line(KEY_ID_FIELD));
static SECRET_LINE: LazyLock<Regex> = LazyLock::new(|| assignment_line(SECRET_FIELD));

/// `field = value` anchored at line start, whitespace-tolerant around `=`.
/// The value is one whitespace-free token compared literally by the caller,
/// so `AKIA1` never matches `AKIA12`. Inline comments survive in `tail`.
fn assignment_line(field: &str) -> Regex {
    let pattern = format!(
        r"(?m)^(?P<indent>[ \t]*){field}[ \t]*=[ \t]*(?P<value>\S+)(?P<tail>[ \t]*(?:[#;][^\n]*)?\r?)$"
    );
    Regex::new(&pattern).expect("assignment pattern is valid")
}

/// Write `contents` atomically with owner-only permissions.
/// A symlinked credentials file keeps its link; the target is replaced.
fn write_private(path: &Path, contents: &str) -> Result<(), StoreError> {
    let target = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let parent = target
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let write_err = |reason: String| StoreError::Write {
        path: path.to_path_buf(),
        reason,
    };

    let mut tmp = NamedTempFile::new_in(&parent).map_err(|e| write_err(e.to_string()))?;
    restrict_permissions(tmp.as_file()).map_err(|e| write_err(e.to_string()))?;
    tmp.write_all(contents.as_bytes())
        .map_err(|e| write_err(e.to_string()))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| write_err(e.to_string()))?;
    tmp.persist(&target)
        .map_err(|e| write_err(e.error.to_string()))?;
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(file: &fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &fs::File) -> std::io::Result<()> {
    Ok(())
}
