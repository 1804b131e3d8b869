//! Relation layer
//!
//! A relation pairs a key kind with a value kind, derives the file names of
//! its public and private stores, decodes values, and chains lookups across
//! relations.

pub mod join;
pub mod kind;
#[allow(clippy::module_inception)]
pub mod relation;
pub mod table;

pub use join::joined_fetch;
pub use kind::{Conversion, Kind, Value};
pub use relation::{Relation, Scope, ValueRow, Variant, PRIVATE_PREFIX};
pub use table::{record_absent, skip_absent, tablise, transpose};
