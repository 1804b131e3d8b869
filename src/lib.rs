//! pkgdb - file-backed relation store for a git-based package manager
//!
//! Layers, bottom up:
//! - `search`: batched binary search over sorted sequences
//! - `io`: block-cached reads of fixed-stride entry regions
//! - `store`: bucketed, length-partitioned multimap files
//! - `relation`: typed relations, scopes and multi-hop joins
//! - `db`: the standard catalog behind an async facade

pub mod db;
pub mod io;
pub mod relation;
pub mod search;
pub mod store;
