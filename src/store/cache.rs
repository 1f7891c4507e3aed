//! Local durable cache: restores preferences across reloads before the server answers.
//!
//! [`LocalCache`] is a plain key → JSON string capability. [`SessionCache`]
//! namespaces keys per session and swallows every failure: a broken cache only
//! means "no restore for this session", never an error for the caller.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::prefs::merge::normalize_record;
use crate::prefs::types::PartialPreferences;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache entry is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Key → JSON-string storage.
pub trait LocalCache: Send {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), CacheError>;
    fn remove(&mut self, key: &str) -> Result<(), CacheError>;
}

/// One JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }
}

/// Percent-encode anything outside `[A-Za-z0-9._-]` so keys map to distinct file names.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

impl LocalCache for FileCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomic write: temp file then rename. Each write gets its own temp file,
    /// so concurrent writers never rename each other's half-written data.
    fn set(&mut self, key: &str, value: &str) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp_path = self
            .dir
            .join(format!("{}.{}.tmp", encode_key(key), uuid::Uuid::now_v7()));
        let written = std::fs::write(&tmp_path, value).and_then(|()| std::fs::rename(&tmp_path, &path));
        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), CacheError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Session-scoped view over a [`LocalCache`].
pub struct SessionCache {
    inner: Box<dyn LocalCache>,
    namespace: String,
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl SessionCache {
    pub fn new(inner: impl LocalCache + 'static, namespace: impl Into<String>) -> Self {
        Self {
            inner: Box::new(inner),
            namespace: namespace.into(),
        }
    }

    pub fn key(&self, session_id: &str) -> String {
        format!("{}:{session_id}", self.namespace)
    }

    /// Read the cached record for a session. Any failure reads as "no entry".
    pub fn load(&self, session_id: &str) -> Option<PartialPreferences> {
        let key = self.key(session_id);
        let raw = match self.inner.get(&key) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "local cache unavailable");
                return None;
            }
        };
        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(value) => Some(normalize_record(&value)).filter(|p| !p.is_empty()),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "discarding unreadable cache entry");
                None
            }
        }
    }

    /// Overwrite the cached record. Returns `false` if the cache rejected it.
    pub fn store(&mut self, session_id: &str, prefs: &PartialPreferences) -> bool {
        let key = self.key(session_id);
        let result = serde_json::to_string(prefs)
            .map_err(CacheError::from)
            .and_then(|json| self.inner.set(&key, &json));
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "local cache write failed");
                false
            }
        }
    }

    pub fn evict(&mut self, session_id: &str) -> bool {
        let key = self.key(session_id);
        match self.inner.remove(&key) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "local cache eviction failed");
                false
            }
        }
    }
}
