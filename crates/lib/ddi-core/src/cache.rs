//! Local refresh cache: last-good snapshot, fingerprint, and catalog.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::{error::Error, fmt, fs, io};

use chrono::{DateTime, Utc};
use ddi_store::models::{ContentFingerprint, HandlerDefinition, SchemaSnapshot};
use serde::{Deserialize, Serialize};

use crate::catalog::HandlerCatalog;

pub const CACHE_FILE_NAME: &str = "catalog.json";
pub const CACHE_FORMAT_VERSION: u32 = 1;

#[derive(Debug)]
pub enum CacheError {
    Io(io::Error),
    Corrupt(String),
    Encode(serde_json::Error),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "cache I/O error: {err}"),
            Self::Corrupt(message) => write!(f, "cache is corrupt: {message}"),
            Self::Encode(err) => write!(f, "failed to encode cache: {err}"),
        }
    }
}

impl Error for CacheError {}

impl From<io::Error> for CacheError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// Everything the fast path needs to serve without rediscovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedCatalog {
    pub format_version: u32,
    pub fingerprint: ContentFingerprint,
    pub snapshot: SchemaSnapshot,
    /// Compiled handlers alone, so a stable refresh can re-merge with the
    /// current custom set without recompiling.
    pub compiled: Vec<HandlerDefinition>,
    pub catalog: HandlerCatalog,
    pub saved_at: DateTime<Utc>,
}

impl PersistedCatalog {
    #[must_use]
    pub fn new(
        fingerprint: ContentFingerprint,
        snapshot: SchemaSnapshot,
        compiled: Vec<HandlerDefinition>,
        catalog: HandlerCatalog,
    ) -> Self {
        Self {
            format_version: CACHE_FORMAT_VERSION,
            fingerprint,
            snapshot,
            compiled,
            catalog,
            saved_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefreshCache {
    path: PathBuf,
}

impl RefreshCache {
    /// Cache stored as `catalog.json` inside `dir`.
    #[must_use]
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(CACHE_FILE_NAME),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted catalog.
    ///
    /// # Errors
    /// Returns `CacheError::Corrupt` when the file exists but does not decode
    /// to the current format, or `CacheError::Io` when it cannot be read.
    pub async fn load(&self) -> Result<Option<PersistedCatalog>, CacheError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let persisted: PersistedCatalog =
            serde_json::from_slice(&raw).map_err(|err| CacheError::Corrupt(err.to_string()))?;
        if persisted.format_version != CACHE_FORMAT_VERSION {
            return Err(CacheError::Corrupt(format!(
                "unsupported format version {}",
                persisted.format_version
            )));
        }
        Ok(Some(persisted))
    }

    /// Writes the catalog to a temporary sibling and renames it into place.
    ///
    /// # Errors
    /// Returns `CacheError` if encoding or any filesystem step fails; the
    /// previous cache file is left untouched in that case.
    pub async fn store(&self, persisted: &PersistedCatalog) -> Result<(), CacheError> {
        let data = serde_json::to_vec_pretty(persisted).map_err(CacheError::Encode)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || atomic_write(&path, &data))
            .await
            .map_err(io::Error::other)??;
        Ok(())
    }
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), CacheError> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let tmp = dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
    let written = (|| -> io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()
    })();
    if let Err(err) = written.and_then(|()| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(err.into());
    }
    if let Ok(dir_file) = fs::File::open(dir) {
        let _ = dir_file.sync_all();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PersistedCatalog {
        PersistedCatalog::new(
            ContentFingerprint("h1".to_string()),
            SchemaSnapshot::new(),
            Vec::new(),
            HandlerCatalog::default(),
        )
    }

    #[tokio::test]
    async fn missing_cache_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = RefreshCache::in_dir(dir.path());
        assert!(cache.load().await.expect("load succeeds").is_none());
    }

    #[tokio::test]
    async fn store_replaces_file_without_leftovers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = RefreshCache::in_dir(dir.path().join("nested"));
        cache.store(&sample()).await.expect("first store");
        let mut second = sample();
        second.fingerprint = ContentFingerprint("h2".to_string());
        cache.store(&second).await.expect("second store");

        let loaded = cache.load().await.expect("load succeeds").expect("cache present");
        assert_eq!(loaded.fingerprint, ContentFingerprint("h2".to_string()));
        let entries: Vec<_> = fs::read_dir(dir.path().join("nested"))
            .expect("read dir")
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec![CACHE_FILE_NAME.to_string()]);
    }

    #[tokio::test]
    async fn undecodable_cache_is_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = RefreshCache::in_dir(dir.path());
        fs::write(cache.path(), b"{\"fingerprint\": 12").expect("write garbage");
        assert!(matches!(cache.load().await, Err(CacheError::Corrupt(_))));
    }
}
