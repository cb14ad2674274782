use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong while decoding a snapshot, computing retained
/// sizes, or touching the on-disk cache.
///
/// `DataSkew` is deliberately not a variant here: an unresolved `Address` is
/// not an error condition a caller can act on, it is expected input. It is
/// recorded by the component that notices it (see `Reader::data_skew_count`)
/// rather than returned as a `Result::Err`.
#[derive(Debug, Error)]
pub enum PyHeapError {
    #[error("malformed snapshot: {0}")]
    Format(#[from] FormatError),

    #[error("i/o error reading {path}: {source}")]
    Resource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Fatal framing/decoding failures. Always propagated, never swallowed.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("bad opening magic: expected {expected:#x}, found {found:#x}")]
    BadOpeningMagic { expected: u64, found: u64 },

    #[error("bad closing magic: expected {expected:#x}, found {found:#x}")]
    BadClosingMagic { expected: u64, found: u64 },

    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u32),

    #[error("unexpected end of snapshot at offset {offset} (needed {needed} more bytes)")]
    Truncated { offset: usize, needed: usize },

    #[error("frequent-attribute index {index} out of range (table has {table_len} entries)")]
    FrequentAttrOutOfRange { index: i64, table_len: usize },

    #[error("string length {len} exceeds remaining buffer of {remaining} bytes")]
    StringOverflow { len: usize, remaining: usize },

    #[error("invalid utf-8 in string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("frequent-attribute table has {0} entries, exceeding the 2^15 limit")]
    TooManyFrequentAttrs(usize),
}

pub type PyHeapResult<T> = Result<T, PyHeapError>;

impl PyHeapError {
    pub fn resource(path: impl Into<PathBuf>, source: io::Error) -> Self {
        PyHeapError::Resource {
            path: path.into(),
            source,
        }
    }
}
