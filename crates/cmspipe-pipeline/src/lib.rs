//! The five-stage pipeline orchestrator.
//!
//! One batch is one logical task that serializes Land → Validate →
//! Normalize → Enrich → Publish over a release, owning the batch
//! record in the run-metadata store throughout. A BLOCK-level error
//! terminates the batch as `failed` with the error recorded; WARN
//! findings accumulate into warnings and the quality score. Only the
//! Land stage retries (inside the fetcher's bounded backoff); every
//! other stage is rerun-by-new-batch. The batch clock and the
//! cancellation token bound the whole run.

pub mod dispatch;
pub mod orchestrator;

pub use orchestrator::{IngestOutcome, Pipeline};
