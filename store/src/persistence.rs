//! Key/value persistence of serializable values.
//!
//! Reads are forgiving: a missing key, an unreadable file or a malformed
//! document all read as "no prior data" and are logged. Writes report failure
//! to the caller, who decides whether it matters (the conversation store only
//! logs it).

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use kiln_utils::{AtomicWriteOptions, PersistMode, atomic_write_with_options, recover_bak_file};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("invalid storage key {0:?}")]
    InvalidKey(String),
    #[error("failed to serialize value for key {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write key {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
}

/// A validated storage key.
///
/// Keys are ASCII alphanumerics plus `-`, `_` and `.`, and may not start with
/// a dot, so a key always maps to a plain file name inside the data directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn new(raw: &str) -> Result<Self, PersistError> {
        let valid = !raw.is_empty()
            && !raw.starts_with('.')
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(PersistError::InvalidKey(raw.to_string()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw byte storage behind the adapter.
pub trait StorageBackend: Send + Sync {
    /// `Ok(None)` when nothing is stored under `key`.
    fn read(&self, key: &StorageKey) -> io::Result<Option<Vec<u8>>>;
    fn write(&self, key: &StorageKey, bytes: &[u8]) -> io::Result<()>;
}

/// One `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path_for(&self, key: &StorageKey) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StorageBackend for FileBackend {
    fn read(&self, key: &StorageKey) -> io::Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        recover_bak_file(&path);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, key: &StorageKey, bytes: &[u8]) -> io::Result<()> {
        // The model configuration may hold an API key.
        let options = AtomicWriteOptions {
            mode: PersistMode::SensitiveOwnerOnly,
            ..AtomicWriteOptions::default()
        };
        atomic_write_with_options(self.path_for(key), bytes, options)
    }
}

/// Process-local backend for tests and ephemeral sessions.
///
/// Clones share the same entries, so a test can keep a handle and inspect what
/// was written.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with an IO error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Raw bytes stored under `key`, if any.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Store raw bytes without going through serialization.
    pub fn insert_raw(&self, key: &str, bytes: impl Into<Vec<u8>>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), bytes.into());
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self, key: &StorageKey) -> io::Result<Option<Vec<u8>>> {
        Ok(self.raw(key.as_str()))
    }

    fn write(&self, key: &StorageKey, bytes: &[u8]) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::other("memory backend write failure injected"));
        }
        self.insert_raw(key.as_str(), bytes);
        Ok(())
    }
}

/// Serializing front-end over a [`StorageBackend`]. Cheap to clone.
#[derive(Clone)]
pub struct PersistenceAdapter {
    backend: Arc<dyn StorageBackend>,
}

impl fmt::Debug for PersistenceAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceAdapter").finish_non_exhaustive()
    }
}

impl PersistenceAdapter {
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    pub fn store<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), PersistError> {
        let key = StorageKey::new(key)?;
        let bytes = serde_json::to_vec(value).map_err(|source| PersistError::Serialize {
            key: key.to_string(),
            source,
        })?;
        self.backend
            .write(&key, &bytes)
            .map_err(|source| PersistError::Io {
                key: key.to_string(),
                source,
            })
    }

    /// Read a list. Anything other than a well-formed list of `T` is empty.
    ///
    /// A list with one bad element is discarded wholesale; partial recovery
    /// could yield a log that was never actually written.
    #[must_use]
    pub fn retrieve_array<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        self.retrieve::<Vec<T>>(key).unwrap_or_default()
    }

    /// Read a single value. Missing, unreadable or malformed data is `None`.
    #[must_use]
    pub fn retrieve<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let key = match StorageKey::new(key) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!("Refusing to read: {e}");
                return None;
            }
        };
        let bytes = match self.backend.read(&key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key = %key, "Failed to read persisted data: {e}");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %key, "Discarding malformed persisted data: {e}");
                None
            }
        }
    }
}
