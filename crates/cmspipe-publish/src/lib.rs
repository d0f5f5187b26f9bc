//! Publishing: curated parquet artifacts, quarantine, run manifests.
//!
//! Curated artifacts are content-addressed and write-once: a rerun
//! over the same release uses a fresh release id, never an overwrite.
//! Column order in every parquet file is the schema's `column_order`
//! followed by the metadata columns, compressed with snappy.

pub mod curated;
pub mod manifest;
pub mod parquet_out;

pub use curated::{publish_dataset, write_quarantine, PublishedDataset};
pub use manifest::{DatasetManifestEntry, ManifestTotals, RunManifest};
