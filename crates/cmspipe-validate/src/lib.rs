//! Validators over parsed frames.
//!
//! A validator is a pure function `(frame, context) → ValidationReport`.
//! Reports carry pass/fail/warning counts, a quality score in [0, 1],
//! and bounded sample failures. BLOCK-severity failures force the
//! aggregate to fail regardless of the mean score; WARN findings only
//! reduce quality.

pub mod business;
pub mod completeness;
pub mod cross;
pub mod domain;
pub mod report;
pub mod structural;

use chrono::NaiveDate;

use cmspipe_kit::frame::Frame;
use cmspipe_schema::SchemaContract;

pub use report::{aggregate, ValidationReport, ValidationSummary};

/// Run the standard per-dataset validator suite.
#[must_use]
pub fn run_standard_suite(
    frame: &Frame,
    contract: &SchemaContract,
    today: NaiveDate,
) -> Vec<ValidationReport> {
    let mut reports = vec![
        structural::required_columns(frame, contract),
        structural::types_coerce(frame, contract),
        domain::pattern_rules(frame, contract),
        business::effective_date_order(frame, today),
        completeness::critical_columns(frame, contract),
    ];
    // The raw locality crosswalk publishes duplicates on purpose;
    // dedup happens in the FIPS normalizer, so uniqueness is only
    // enforced from stage 2 onward.
    if contract.dataset != "locality_raw" {
        reports.push(business::natural_key_unique(frame, contract));
    }
    if contract.dataset == "pprrvu" {
        reports.push(business::rvu_status_rules(frame));
    }
    reports
}
