//! Content-addressed disk cache for computed [`RetainedHeap`] results.
//!
//! Keyed by the SHA-1 digest of the whole snapshot file plus a fixed
//! algorithm-version integer, optionally rooted at a configured cache
//! directory, serialized as JSON.

use std::fs;
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};
use tracing::{info, warn};

use crate::error::{PyHeapError, PyHeapResult};
use crate::retained_heap::RetainedHeap;

/// Bumped whenever Phase 1/2/3 semantics change in a way that would make a
/// previously cached result incorrect.
pub const ALGORITHM_VERSION: u32 = 1;

pub struct RetainedHeapCache {
    cache_dir: Option<PathBuf>,
}

impl RetainedHeapCache {
    pub fn new(cache_dir: Option<PathBuf>) -> Self {
        RetainedHeapCache { cache_dir }
    }

    pub fn load(&self, snapshot_path: &Path, digest: &str) -> Option<RetainedHeap> {
        let path = self.cache_file_path(snapshot_path, digest);
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(heap) => {
                info!(path = %path.display(), "retained-heap cache hit");
                Some(heap)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "retained-heap cache corrupted, treating as miss");
                None
            }
        }
    }

    pub fn store(
        &self,
        snapshot_path: &Path,
        digest: &str,
        heap: &RetainedHeap,
    ) -> PyHeapResult<()> {
        let path = self.cache_file_path(snapshot_path, digest);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| PyHeapError::resource(parent, e))?;
        }
        let content = serde_json::to_string(heap)
            .map_err(|e| PyHeapError::resource(&path, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        fs::write(&path, content).map_err(|e| PyHeapError::resource(&path, e))
    }

    fn cache_file_path(&self, snapshot_path: &Path, digest: &str) -> PathBuf {
        let basename = snapshot_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snapshot".to_string());
        let filename = format!("{}.{}.{}.retained_heap", basename, digest, ALGORITHM_VERSION);
        match &self.cache_dir {
            Some(dir) => dir.join(filename),
            None => snapshot_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(filename),
        }
    }
}

/// SHA-1 hex digest of an entire snapshot file's bytes, used as half of the
/// cache key (the other half is [`ALGORITHM_VERSION`]).
pub fn digest_snapshot(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Loads the cached result if present, otherwise computes and stores it.
pub fn provide_with_caching<F>(
    cache: &RetainedHeapCache,
    snapshot_path: &Path,
    snapshot_bytes: &[u8],
    compute: F,
) -> PyHeapResult<RetainedHeap>
where
    F: FnOnce() -> RetainedHeap,
{
    let digest = digest_snapshot(snapshot_bytes);
    if let Some(cached) = cache.load(snapshot_path, &digest) {
        return Ok(cached);
    }
    let computed = compute();
    cache.store(snapshot_path, &digest, &computed)?;
    Ok(computed)
}
