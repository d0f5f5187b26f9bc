//! Schema contracts and fixed-width layouts.
//!
//! A [`SchemaContract`] is the versioned declarative document every
//! parser and validator works from: column types and domains, natural
//! keys, the hashing column order, numeric precision and rounding, and
//! the metadata columns excluded from content hashes. A [`LayoutSpec`]
//! describes the byte offsets of a fixed-width file. The
//! [`SchemaRegistry`] holds the built-in contracts for the CMS
//! datasets this pipeline publishes.

pub mod contract;
pub mod layout;
pub mod registry;

pub use contract::{ColumnSpec, ColumnType, SchemaContract, METADATA_COLUMNS};
pub use layout::{LayoutColumn, LayoutSpec};
pub use registry::SchemaRegistry;
