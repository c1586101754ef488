//! Filesystem-backed encrypted session store

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use hbsync_core::{
    domain::{Session, SessionSummary},
    ports::{ISessionStore, SessionStoreError},
};

use crate::crypto::{SecureKey, SessionKeys};

/// Plaintext metadata summary
pub const META_FILE: &str = "session.meta.json";
/// Encrypted session payload
pub const PAYLOAD_FILE: &str = "session.bin";
/// Master key
pub const KEY_FILE: &str = "session.key";

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SessionMetadata {
    version: u32,
    created_at: DateTime<Utc>,
    last_validated_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    cookie_count: usize,
    /// Base64 HMAC-SHA256 of the encrypted payload
    signature: String,
}

#[derive(Serialize, Deserialize)]
struct SessionPayload {
    version: u32,
    session: Session,
}

/// Session store keeping its files in one private directory
#[derive(Debug, Clone)]
pub struct EncryptedSessionStore {
    dir: PathBuf,
}

impl EncryptedSessionStore {
    /// Creates a store rooted at `dir`; nothing is touched until the first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn meta_path(&self) -> PathBuf {
        self.dir.join(META_FILE)
    }

    pub fn payload_path(&self) -> PathBuf {
        self.dir.join(PAYLOAD_FILE)
    }

    pub fn key_path(&self) -> PathBuf {
        self.dir.join(KEY_FILE)
    }

    async fn ensure_dir(&self) -> Result<(), SessionStoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| persistence("create session directory", &e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.dir, std::fs::Permissions::from_mode(0o700))
                .await
                .map_err(|e| persistence("restrict session directory", &e))?;
        }
        Ok(())
    }

    /// Reads the master key, creating one if none exists or it is unreadable
    async fn load_or_create_key(&self) -> Result<SecureKey, SessionStoreError> {
        match tokio::fs::read(self.key_path()).await {
            Ok(bytes) => match SecureKey::from_slice(&bytes) {
                Ok(key) => return Ok(key),
                Err(err) => warn!(error = %err, "Replacing invalid session key"),
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Generating new session key");
            }
            Err(e) => return Err(persistence("read session key", &e)),
        }

        let key = SecureKey::generate();
        write_atomic(&self.key_path(), key.as_bytes()).await?;
        Ok(key)
    }

    /// Reads the master key for decryption; a missing key means the payload
    /// can never be decrypted
    async fn read_key(&self) -> Result<SecureKey, SessionStoreError> {
        let bytes = match tokio::fs::read(self.key_path()).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SessionStoreError::Corrupt("session key is missing".into()))
            }
            Err(e) => return Err(persistence("read session key", &e)),
        };
        SecureKey::from_slice(&bytes).map_err(|e| SessionStoreError::Corrupt(e.to_string()))
    }

    async fn read_metadata(&self) -> Result<Option<SessionMetadata>, SessionStoreError> {
        let bytes = match tokio::fs::read(self.meta_path()).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(persistence("read session metadata", &e)),
        };
        let meta: SessionMetadata = serde_json::from_slice(&bytes)
            .map_err(|e| SessionStoreError::Corrupt(format!("metadata: {e}")))?;
        if meta.version != FORMAT_VERSION {
            return Err(SessionStoreError::Corrupt(format!(
                "unsupported session format version {}",
                meta.version
            )));
        }
        Ok(Some(meta))
    }
}

#[async_trait]
impl ISessionStore for EncryptedSessionStore {
    async fn save(&self, session: &Session) -> Result<(), SessionStoreError> {
        self.ensure_dir().await?;
        let keys = SessionKeys::derive(&self.load_or_create_key().await?);

        let plaintext = serde_json::to_vec(&SessionPayload {
            version: FORMAT_VERSION,
            session: session.clone(),
        })
        .map_err(|e| SessionStoreError::Persistence(format!("serialize session: {e}")))?;

        let blob = keys
            .encrypt(&plaintext)
            .map_err(|e| SessionStoreError::Persistence(e.to_string()))?;
        let signature = keys
            .sign(&blob)
            .map_err(|e| SessionStoreError::Persistence(e.to_string()))?;

        let meta = SessionMetadata {
            version: FORMAT_VERSION,
            created_at: session.created_at(),
            last_validated_at: session.last_validated_at(),
            expires_at: session.expires_at(),
            cookie_count: session.cookies().len(),
            signature: STANDARD.encode(signature),
        };
        let meta_bytes = serde_json::to_vec_pretty(&meta)
            .map_err(|e| SessionStoreError::Persistence(format!("serialize metadata: {e}")))?;

        // Payload first: a crash in between leaves metadata whose signature
        // no longer matches, which loads as an integrity failure.
        write_atomic(&self.payload_path(), &blob).await?;
        write_atomic(&self.meta_path(), &meta_bytes).await?;

        debug!(
            cookies = meta.cookie_count,
            expires_at = %meta.expires_at,
            "Session persisted"
        );
        Ok(())
    }

    async fn load(&self) -> Result<Session, SessionStoreError> {
        let meta = self
            .read_metadata()
            .await?
            .ok_or(SessionStoreError::NotFound)?;

        let blob = match tokio::fs::read(self.payload_path()).await {
            Ok(blob) => blob,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SessionStoreError::Corrupt("session payload is missing".into()))
            }
            Err(e) => return Err(persistence("read session payload", &e)),
        };

        let keys = SessionKeys::derive(&self.read_key().await?);
        let plaintext = keys
            .decrypt(&blob)
            .map_err(|e| SessionStoreError::Corrupt(e.to_string()))?;
        let payload: SessionPayload = serde_json::from_slice(&plaintext)
            .map_err(|e| SessionStoreError::Corrupt(format!("payload: {e}")))?;

        let signature = STANDARD.decode(&meta.signature).map_err(|_| {
            SessionStoreError::Integrity("signature is not valid base64".into())
        })?;
        if !keys.verify(&blob, &signature) {
            return Err(SessionStoreError::Integrity(
                "payload does not match its signature".into(),
            ));
        }

        debug!(cookies = payload.session.cookies().len(), "Session loaded");
        Ok(payload.session.with_signature(meta.signature))
    }

    async fn invalidate(&self) -> Result<(), SessionStoreError> {
        // Metadata goes first so a partial removal reads as "no session"
        for path in [self.meta_path(), self.payload_path(), self.key_path()] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(persistence("remove session file", &e)),
            }
        }
        info!(dir = %self.dir.display(), "Session material removed");
        Ok(())
    }

    async fn inspect(&self) -> Result<Option<SessionSummary>, SessionStoreError> {
        Ok(self.read_metadata().await?.map(|meta| SessionSummary {
            created_at: meta.created_at,
            last_validated_at: meta.last_validated_at,
            expires_at: meta.expires_at,
            cookie_count: meta.cookie_count,
        }))
    }
}

fn persistence(action: &str, err: &std::io::Error) -> SessionStoreError {
    SessionStoreError::Persistence(format!("{action}: {err}"))
}

/// Writes `bytes` to a temporary sibling of `path`, syncs it, then renames
/// it over `path`. Files are created owner-read/write only.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SessionStoreError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "session".to_string());
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options
        .open(&tmp)
        .await
        .map_err(|e| persistence("create temporary file", &e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| persistence("write temporary file", &e))?;
    file.sync_all()
        .await
        .map_err(|e| persistence("sync temporary file", &e))?;
    drop(file);

    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| persistence("rename temporary file", &e))
}
