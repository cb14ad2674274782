//! Post-mortem heap snapshot codec and retained-size analyzer.
//!
//! A snapshot is produced by an external process walker (out of scope here)
//! and consumed through [`reader::SnapshotReader`]. [`retained_heap`]
//! computes, for every object and every thread, how much heap would become
//! unreachable if it vanished.

pub mod aggregations;
pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod inbound_index;
pub mod pagination;
pub mod reader;
pub mod retained_heap;
pub mod schema;
pub mod str_repr;
pub mod writer;

pub use error::{FormatError, PyHeapError, PyHeapResult};
pub use reader::SnapshotReader;
pub use schema::{Address, Heap, HeapObject, TypeId};
pub use writer::SnapshotWriter;
