use std::{
    fmt,
    path::PathBuf,
    sync::{Arc, Mutex},
};

/// Auditable state transitions of a rotation. Never carries secrets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationEvent {
    UsingKey { key_id: String, profile: String },
    CallerVerified { arn: String },
    KeysListed { count: usize },
    WouldDeleteExtraKey { key_id: String },
    ExtraKeyDeleted { key_id: String },
    WouldCreateKey,
    WouldUpdateFile { path: PathBuf },
    WouldDeleteCurrentKey { key_id: String },
    KeyCreated { key_id: String },
    CredentialsWritten { path: PathBuf },
    RolledBackNewKey { key_id: String },
    OldKeyDeleted { key_id: String },
    Completed { dry_run: bool },
}

impl fmt::Display for RotationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RotationEvent::UsingKey { key_id, profile } => {
                write!(f, "Using access key {key_id} from profile '{profile}'.")
            }
            RotationEvent::CallerVerified { arn } => write!(f, "Your user arn is: {arn}"),
            RotationEvent::KeysListed { count } => write!(f, "Found {count} access key(s)."),
            RotationEvent::WouldDeleteExtraKey { key_id } => {
                write!(f, "Pretending to delete {key_id}")
            }
            RotationEvent::ExtraKeyDeleted { key_id } => write!(f, "Deleted access key {key_id}"),
            RotationEvent::WouldCreateKey => f.write_str("Pretending to create a new key..."),
            RotationEvent::WouldUpdateFile { path } => write!(
                f,
                "Pretending to update credentials file {}...",
                path.display()
            ),
            RotationEvent::WouldDeleteCurrentKey { key_id } => {
                write!(f, "Pretending to delete current key {key_id}...")
            }
            RotationEvent::KeyCreated { key_id } => write!(f, "Created new access key {key_id}"),
            RotationEvent::CredentialsWritten { path } => {
                write!(f, "Wrote new key pair to {}", path.display())
            }
            RotationEvent::RolledBackNewKey { key_id } => write!(
                f,
                "Removed new access key {key_id} after the credentials file update failed"
            ),
            RotationEvent::OldKeyDeleted { key_id } => {
                write!(f, "Deleted old access key {key_id}")
            }
            RotationEvent::Completed { dry_run: true } => {
                f.write_str("All good, pretending worked.")
            }
            RotationEvent::Completed { dry_run: false } => {
                f.write_str("Key rotation completed successfully!")
            }
        }
    }
}

/// Receives rotation events as they happen.
pub trait RotationObserver: Send + Sync {
    fn on_event(&self, event: &RotationEvent);
}

impl<F> RotationObserver for F
where
    F: Fn(&RotationEvent) + Send + Sync,
{
    fn on_event(&self, event: &RotationEvent) {
        self(event)
    }
}

/// Observer that keeps every event, for tests and summaries.
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<RotationEvent>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RotationEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl RotationObserver for RecordingObserver {
    fn on_event(&self, event: &RotationEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}
