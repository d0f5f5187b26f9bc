//! Locality FIPS normalization (stage 2).
//!
//! Transforms the raw, name-based locality rows from stage 1 into
//! canonical FIPS-coded rows: one row per
//! `(mac, locality_code, state_fips, county_fips)`. State names
//! resolve through an alias table, county lists expand through set
//! expressions (`ALL COUNTIES`, `ALL COUNTIES EXCEPT …`,
//! `REST OF …`, explicit lists), and county names match against the
//! census reference in tiers: exact, alias, then optionally fuzzy.
//! Rows that cannot be resolved are quarantined with a structured
//! reason; expansion never crosses a state boundary.

pub mod expand;
pub mod matcher;
pub mod normalize;
pub mod reference;
pub mod state;

pub use normalize::{normalize_locality_fips, NormalizeOptions};
pub use reference::{CountyRef, FipsReference};
pub use state::resolve_state;
