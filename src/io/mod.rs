//! Block-aligned read layer
//!
//! Store files are read through a [`BlockCache`]: a single cached block,
//! aligned to the filesystem block size, over a seekable stream. Lookups in a
//! bucket touch neighbouring entries, so one block usually serves a whole
//! binary search tail and the following duplicate-key walk.

pub mod block_cache;
pub mod error;

pub use block_cache::{detect_lb_block_size, BlockCache, EntryRegion, DEFAULT_LB_BLOCK_SIZE};
pub use error::{IoError, IoResult};
