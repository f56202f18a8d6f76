//! Contact artifact store.
//!
//! Artifacts are immutable JSON documents published by the structural pipeline,
//! one per interaction id, under the logical namespace `contacts/{id}.json`.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use ppi_core::contacts::ContactArtifact;
use ppi_core::error::{ErrorCode, PpiError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub const CONTACTS_NAMESPACE: &str = "contacts";

/// Longest id accepted; `u64::MAX` has 20 digits, so 19 always fits.
const MAX_ID_DIGITS: usize = 19;

/// Distinguishes staging files of concurrent publishers within one process.
static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("malformed interaction id: {0:?}")]
    InvalidId(String),
    #[error("storage error for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("artifact {0} is not valid JSON")]
    Malformed(String),
    #[error("artifact {0} already published with different content")]
    AlreadyPublished(String),
    #[error("artifact encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl PpiError for ArtifactError {
    fn error_code(&self) -> ErrorCode {
        match self {
            ArtifactError::InvalidId(_) => ErrorCode::InvalidArgument,
            ArtifactError::AlreadyPublished(_) => ErrorCode::Conflict,
            ArtifactError::Io { .. } | ArtifactError::Malformed(_) | ArtifactError::Encode(_) => {
                ErrorCode::Internal
            }
        }
    }
}

/// Validated artifact address. Only ever built from an all-digit id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactKey(u64);

impl ArtifactKey {
    pub fn new(interaction_id: u64) -> Self {
        Self(interaction_id)
    }

    /// Allow-list parse: ASCII digits only, so no separator or dot can reach a path.
    pub fn parse(raw: &str) -> Result<Self, ArtifactError> {
        if raw.is_empty()
            || raw.len() > MAX_ID_DIGITS
            || !raw.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(ArtifactError::InvalidId(raw.to_string()));
        }
        raw.parse::<u64>()
            .map(Self)
            .map_err(|_| ArtifactError::InvalidId(raw.to_string()))
    }

    pub fn interaction_id(&self) -> u64 {
        self.0
    }

    /// Logical key, e.g. `contacts/42.json`.
    pub fn object_key(&self) -> String {
        format!("{}/{}.json", CONTACTS_NAMESPACE, self.0)
    }

    fn file_name(&self) -> String {
        format!("{}.json", self.0)
    }
}

impl std::fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Raw document bytes, or `None` when nothing was published for the key yet.
    async fn fetch(&self, key: &ArtifactKey) -> Result<Option<Bytes>, ArtifactError>;

    /// Write-once publish. Identical bytes are a no-op, different bytes are rejected.
    async fn publish(&self, key: &ArtifactKey, document: Bytes) -> Result<(), ArtifactError>;
}

/// Serialize and publish a typed artifact under its own interaction id.
pub async fn publish_artifact(
    store: &dyn ContactStore,
    artifact: &ContactArtifact,
) -> Result<ArtifactKey, ArtifactError> {
    let key = ArtifactKey::new(artifact.interaction_id);
    let document = Bytes::from(serde_json::to_vec(artifact)?);
    store.publish(&key, document).await?;
    Ok(key)
}

/// Artifacts on a local filesystem under `{root}/contacts/`.
pub struct FsContactStore {
    dir: PathBuf,
}

impl FsContactStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            dir: root.as_ref().join(CONTACTS_NAMESPACE),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &ArtifactKey) -> PathBuf {
        self.dir.join(key.file_name())
    }
}

#[async_trait]
impl ContactStore for FsContactStore {
    async fn fetch(&self, key: &ArtifactKey) -> Result<Option<Bytes>, ArtifactError> {
        match fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ArtifactError::Io {
                key: key.object_key(),
                source,
            }),
        }
    }

    async fn publish(&self, key: &ArtifactKey, document: Bytes) -> Result<(), ArtifactError> {
        ensure_json(key, &document)?;
        if let Some(existing) = self.fetch(key).await? {
            return same_or_conflict(key, &existing, &document);
        }

        let io_err = |source| ArtifactError::Io {
            key: key.object_key(),
            source,
        };
        fs::create_dir_all(&self.dir).await.map_err(io_err)?;

        // Each publisher stages its own file; the hard link fails if the
        // final name exists, so the first complete document wins.
        let path = self.path_for(key);
        let staging = self.dir.join(format!(
            ".{}.{}.{}.tmp",
            key.file_name(),
            std::process::id(),
            STAGING_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let linked = stage_and_link(&staging, &path, &document).await;
        if let Err(e) = fs::remove_file(&staging).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %staging.display(), error = %e, "failed to remove staging file");
            }
        }

        match linked {
            Ok(()) => {
                tracing::debug!(key = %key.object_key(), bytes = document.len(), "contact artifact published");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => match self.fetch(key).await? {
                Some(existing) => same_or_conflict(key, &existing, &document),
                None => Err(ArtifactError::AlreadyPublished(key.object_key())),
            },
            Err(source) => Err(io_err(source)),
        }
    }
}

async fn stage_and_link(staging: &Path, dest: &Path, document: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(staging)
        .await?;
    file.write_all(document).await?;
    file.sync_all().await?;
    drop(file);
    fs::hard_link(staging, dest).await
}

#[derive(Default)]
pub struct InMemoryContactStore {
    documents: DashMap<ArtifactKey, Bytes>,
}

impl InMemoryContactStore {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl ContactStore for InMemoryContactStore {
    async fn fetch(&self, key: &ArtifactKey) -> Result<Option<Bytes>, ArtifactError> {
        Ok(self.documents.get(key).map(|entry| entry.value().clone()))
    }

    async fn publish(&self, key: &ArtifactKey, document: Bytes) -> Result<(), ArtifactError> {
        ensure_json(key, &document)?;
        match self.documents.entry(*key) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                same_or_conflict(key, existing.get(), &document)
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(document);
                Ok(())
            }
        }
    }
}

/// Reject bytes that are not a JSON document.
pub fn ensure_json(key: &ArtifactKey, document: &[u8]) -> Result<(), ArtifactError> {
    serde_json::from_slice::<serde::de::IgnoredAny>(document)
        .map(|_| ())
        .map_err(|_| ArtifactError::Malformed(key.object_key()))
}

fn same_or_conflict(key: &ArtifactKey, existing: &[u8], incoming: &[u8]) -> Result<(), ArtifactError> {
    if existing == incoming {
        Ok(())
    } else {
        Err(ArtifactError::AlreadyPublished(key.object_key()))
    }
}
