//! Geography: published tables, the distance engine, and the
//! nearest-ZIP resolver.
//!
//! The resolver consumes only published, enriched tables (ZIP5
//! locality, ZIP9 overrides, the ZIP→ZCTA crosswalk, centroids, the
//! NBER pair distances, and ZIP metadata) and never reaches back
//! into the ingestion pipeline. Every resolution can leave an
//! immutable trace for audit.

pub mod audit;
pub mod distance;
pub mod resolver;
pub mod tables;
pub mod trace;

pub use audit::{audit_traces, TraceAudit};
pub use distance::{DistanceEngine, DistanceMethod, DistanceResult};
pub use resolver::{NearestZipResolver, NearestZipResult, ResolverOptions};
pub use tables::{
    CentroidProvenance, GeographyTables, TablesDump, Zip5Locality, Zip9Override, ZipMetadata,
    ZipToZctaCrosswalk, ZctaCentroid,
};
pub use trace::{AsymmetryCheck, Trace};
