//! Foundation types for the cmspipe workspace.
//!
//! This crate holds everything the other crates share: identifiers,
//! the batch (ingestion-run) record, validation severities and run
//! statuses, the typed value model used by frames, the library-level
//! error taxonomy, and the small infrastructure helpers (canonical
//! JSON emission, atomic file writes, tracing setup, configuration).
//!
//! Nothing in this crate performs I/O against CMS sources or the
//! run-metadata store; it is a pure leaf that every subsystem depends
//! on.

pub mod atomic_write;
pub mod batch;
pub mod config;
pub mod error;
pub mod ids;
pub mod jcs;
pub mod logging;
pub mod types;
pub mod value;

pub use batch::{BatchRecord, PillarSnapshot, ProcessingTelemetry, SourceFileRef};
pub use config::PipelineConfig;
pub use error::{
    InputError, ParseError, PipelineError, ReferentialError, ResolverError, SourceError,
    StoreError, TransportError,
};
pub use ids::{BatchId, ReleaseId, TraceId};
pub use types::{HealthStatus, RunStatus, Severity};
pub use value::{RoundingMode, Value};
