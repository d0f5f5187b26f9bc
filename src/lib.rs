//! cmspipe: ingestion and normalization pipeline for CMS published
//! reference files.
//!
//! The workspace crates compose into a five-stage pipeline
//! (Land → Validate → Normalize → Enrich → Publish) over CMS source
//! bundles, publishing idempotent, content-addressed artifacts with
//! full provenance, plus the nearest-ZIP resolver that consumes the
//! published geography tables.
//!
//! This facade re-exports the public surface for embedders; the
//! `cmspipe` binary wires the same pieces behind a CLI.

pub use cmspipe_fips::{normalize_locality_fips, FipsReference, NormalizeOptions};
pub use cmspipe_geo::{
    DistanceEngine, GeographyTables, NearestZipResolver, NearestZipResult, ResolverOptions,
    TablesDump,
};
pub use cmspipe_kit::{Frame, ParseMetrics, ParseResult};
pub use cmspipe_land::fetch::HttpProvider;
pub use cmspipe_land::source::{FixtureProvider, ReleaseDescriptor, SourceFile, SourceProvider};
pub use cmspipe_observe::{AlertEngine, DatasetExpectation, ObservabilityCollector};
pub use cmspipe_pipeline::{IngestOutcome, Pipeline};
pub use cmspipe_schema::{SchemaContract, SchemaRegistry};
pub use cmspipe_store::MetadataStore;
pub use cmspipe_types::{
    BatchId, BatchRecord, PipelineConfig, PipelineError, ReleaseId, ResolverError, RunStatus,
    Severity,
};
