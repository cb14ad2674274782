//! Cache hit/miss and corruption-as-miss behavior.

use std::path::PathBuf;

use pyheap::cache::{provide_with_caching, RetainedHeapCache};
use pyheap::retained_heap::RetainedHeap;
use tempfile::tempdir;

fn sample_heap() -> RetainedHeap {
    let heap_json = serde_json::json!({ "objects": { "1": 30 }, "threads": {} });
    serde_json::from_value(heap_json).unwrap()
}

#[test]
fn cache_hit_returns_an_equivalent_result_without_recomputing() {
    let dir = tempdir().unwrap();
    let snapshot_path: PathBuf = dir.path().join("snapshot.pyheap");
    std::fs::write(&snapshot_path, b"fake snapshot bytes").unwrap();

    let cache = RetainedHeapCache::new(Some(dir.path().to_path_buf()));
    let bytes = std::fs::read(&snapshot_path).unwrap();

    let mut calls = 0;
    let first = provide_with_caching(&cache, &snapshot_path, &bytes, || {
        calls += 1;
        sample_heap()
    })
    .unwrap();

    let second = provide_with_caching(&cache, &snapshot_path, &bytes, || {
        calls += 1;
        sample_heap()
    })
    .unwrap();

    assert_eq!(first, second);
    assert_eq!(calls, 1, "second call should have been served from cache");
}

#[test]
fn corrupted_cache_file_is_treated_as_a_miss() {
    let dir = tempdir().unwrap();
    let snapshot_path: PathBuf = dir.path().join("snapshot.pyheap");
    std::fs::write(&snapshot_path, b"fake snapshot bytes").unwrap();
    let bytes = std::fs::read(&snapshot_path).unwrap();

    let cache = RetainedHeapCache::new(Some(dir.path().to_path_buf()));
    let digest = pyheap::cache::digest_snapshot(&bytes);
    let cache_file = dir.path().join(format!(
        "snapshot.pyheap.{}.{}.retained_heap",
        digest,
        pyheap::cache::ALGORITHM_VERSION
    ));
    std::fs::write(&cache_file, b"not json").unwrap();

    let result = provide_with_caching(&cache, &snapshot_path, &bytes, sample_heap).unwrap();
    assert_eq!(result, sample_heap());
}
