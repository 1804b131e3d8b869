//! Store subsystem
//!
//! A file-backed multimap from keys to fixed-width values. Keys are split by
//! length class into separate files; inside a file they are bucketed by a
//! hash of a few representative bytes and kept sorted, with a MasterIndex of
//! per-bucket counts at the head of the file.

pub mod error;
mod file;
pub mod format;
mod rewrite;
#[allow(clippy::module_inception)]
pub mod store;

pub use error::{StoreError, StoreResult};
pub use format::{bucket_of, length_class, MAX_KEY_LEN, MAX_LENGTH_CLASS};
pub use store::{FetchRow, Pair, Store, StoreConfig};
