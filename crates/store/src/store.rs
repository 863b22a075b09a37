//! The two-tier artifact store.
//!
//! The remote backend is authoritative; the staging directory holds one local
//! copy per cache key touched during the process lifetime. The directory is
//! created when the store is built and removed wholesale when it is dropped;
//! staged files are never deleted individually.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use remcache_core::{Error, Result};
use tempfile::TempDir;
use tracing::debug;

use crate::backend::{Object, ObjectBackend, META_OUTPUT_ID, META_TIME};

/// A successful lookup: the artifact is staged locally and described fully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHit {
    pub output_id: Vec<u8>,
    pub size: i64,
    pub disk_path: PathBuf,
    pub time: Option<DateTime<Utc>>,
}

/// Two-tier artifact repository keyed by opaque action IDs.
///
/// A get and a put racing on the same key are unsynchronized: keys are
/// expected to derive from immutable inputs, so concurrent writers produce
/// redundant content and no ordering is promised.
pub struct Store {
    backend: Arc<dyn ObjectBackend>,
    prefix: Option<String>,
    staging: TempDir,
    stats: StoreStats,
}

impl Store {
    /// Creates the staging directory and wraps the pre-built backend handle.
    pub fn new(backend: Arc<dyn ObjectBackend>, prefix: Option<String>) -> Result<Self> {
        let staging = tempfile::Builder::new()
            .prefix("remcache-")
            .tempdir()
            .map_err(|error| {
                Error::staging(std::env::temp_dir(), "create staging directory", error)
            })?;
        debug!(path = %staging.path().display(), "created staging directory");

        Ok(Store {
            backend,
            prefix,
            staging,
            stats: StoreStats::default(),
        })
    }

    /// The process-scoped staging directory.
    #[must_use]
    pub fn staging_dir(&self) -> &Path {
        self.staging.path()
    }

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn remote_key(&self, action_id: &[u8]) -> String {
        let key = hex::encode(action_id);
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{key}"),
            None => key,
        }
    }

    fn disk_path(&self, action_id: &[u8]) -> PathBuf {
        self.staging.path().join(hex::encode(action_id))
    }

    /// Looks up `action_id` remotely and stages the artifact locally.
    ///
    /// `Ok(None)` is a miss: the backend reported absence, or the entry
    /// exists without the output-id metadata that makes it usable. A corrupt
    /// output-id field is an error, not a miss, since the entry exists but
    /// cannot be read.
    pub async fn get(&self, action_id: &[u8]) -> Result<Option<ArtifactHit>> {
        let key = self.remote_key(action_id);

        let object = match self.backend.get(&key).await {
            Ok(Some(object)) => object,
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                debug!(%key, "remote miss");
                return Ok(None);
            }
            Err(error) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                return Err(error);
            }
        };

        let Some(output_id_hex) = object.metadata.get(META_OUTPUT_ID) else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            debug!(%key, "entry lacks an output id, treating as miss");
            return Ok(None);
        };

        let output_id = match hex::decode(output_id_hex) {
            Ok(output_id) => output_id,
            Err(error) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                return Err(Error::metadata(&key, META_OUTPUT_ID, error.to_string()));
            }
        };

        let path = self.disk_path(action_id);
        if let Err(error) = tokio::fs::write(&path, &object.body).await {
            self.stats.errors.fetch_add(1, Ordering::Relaxed);
            return Err(Error::staging(&path, "write staged artifact", error));
        }

        let time = object
            .metadata
            .get(META_TIME)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|time| time.with_timezone(&Utc));

        self.stats.hits.fetch_add(1, Ordering::Relaxed);
        debug!(%key, size = object.body.len(), "staged remote artifact");

        Ok(Some(ArtifactHit {
            output_id,
            size: object.body.len() as i64,
            disk_path: path,
            time,
        }))
    }

    /// Stores `body` under `action_id`, staging locally before uploading.
    ///
    /// A failed local write aborts before the upload; a failed upload leaves
    /// the staged file behind but the put still fails as a whole.
    pub async fn put(&self, action_id: &[u8], output_id: &[u8], body: Bytes) -> Result<PathBuf> {
        let path = self.disk_path(action_id);
        if let Err(error) = tokio::fs::write(&path, &body).await {
            self.stats.errors.fetch_add(1, Ordering::Relaxed);
            return Err(Error::staging(&path, "write staged artifact", error));
        }

        let key = self.remote_key(action_id);
        let object = Object::new(
            body,
            hex::encode(output_id),
            Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
        );
        if let Err(error) = self.backend.put(&key, object).await {
            self.stats.errors.fetch_add(1, Ordering::Relaxed);
            return Err(error);
        }

        self.stats.puts.fetch_add(1, Ordering::Relaxed);
        debug!(%key, "uploaded artifact");
        Ok(path)
    }
}

/// Operation counters, snapshotted for the shutdown log line.
#[derive(Debug, Default)]
struct StoreStats {
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    errors: AtomicU64,
}

impl StoreStats {
    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;

    fn store_with_prefix(prefix: Option<&str>) -> Store {
        Store::new(Arc::new(MemoryBackend::new()), prefix.map(str::to_string)).expect("store")
    }

    #[test]
    fn remote_keys_are_hex_with_optional_namespace() {
        let bare = store_with_prefix(None);
        assert_eq!(bare.remote_key(&[0xaa, 0xbb]), "aabb");

        let namespaced = store_with_prefix(Some("ci"));
        assert_eq!(namespaced.remote_key(&[0xaa, 0xbb]), "ci/aabb");
    }

    #[test]
    fn disk_paths_never_carry_the_namespace() {
        let namespaced = store_with_prefix(Some("ci"));
        let path = namespaced.disk_path(&[0xaa, 0xbb]);
        assert_eq!(path, namespaced.staging_dir().join("aabb"));
    }
}
