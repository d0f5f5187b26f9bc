//! Parser kit: the shared machinery every format parser is built from.
//!
//! The kit guarantees that the same bytes always produce the same
//! canonical rows and content hashes. It owns:
//!
//! - the [`Frame`]/[`RejectFrame`]/[`ParseResult`] model,
//! - the encoding cascade (BOM strip → strict UTF-8 → CP1252 → Latin-1),
//! - header and string-value normalization,
//! - typed casting with exact-decimal canonicalization,
//! - categorical domain enforcement and natural-key uniqueness,
//! - deterministic SHA-256 row hashing over the schema column order,
//! - metadata injection and frame finalization with the join
//!   invariant (`total_rows == data + rejects`) asserted on exit.

pub mod cast;
pub mod categorical;
pub mod encoding;
pub mod finalize;
pub mod frame;
pub mod hash;
pub mod metadata;
pub mod metrics;
pub mod normalize;
pub mod range;
pub mod uniqueness;

pub use encoding::{decode_with_cascade, DecodedText};
pub use finalize::finalize;
pub use frame::{Frame, ParseResult, Reject, RejectFrame};
pub use hash::{row_content_hash, HASH_SEPARATOR};
pub use metadata::MetadataContext;
pub use metrics::ParseMetrics;
