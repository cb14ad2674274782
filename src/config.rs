//! Analyzer configuration, assembled from CLI flags and the
//! `PYHEAP_CACHE_DIR` environment variable.

use std::env;
use std::path::PathBuf;

use crate::retained_heap::DEFAULT_CHUNK_SIZE;

#[derive(Clone, Debug)]
pub struct Config {
    pub cache_dir: Option<PathBuf>,
    pub parallel: bool,
    /// `0` lets the parallel calculator size chunks from the detected core
    /// count; see `retained_heap::DEFAULT_CHUNK_SIZE`.
    pub chunk_size: usize,
    pub top_n: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cache_dir: env::var_os("PYHEAP_CACHE_DIR").map(PathBuf::from),
            parallel: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            top_n: 100,
        }
    }
}

impl Config {
    pub fn with_cache_dir(mut self, dir: Option<PathBuf>) -> Self {
        if dir.is_some() {
            self.cache_dir = dir;
        }
        self
    }
}
