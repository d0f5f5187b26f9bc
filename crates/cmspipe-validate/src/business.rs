//! Business rules: key uniqueness, effective dating, RVU semantics.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use cmspipe_kit::frame::Frame;
use cmspipe_schema::SchemaContract;
use cmspipe_types::{RoundingMode, Severity, Value};

use crate::report::ValidationReport;

/// Natural keys must be unique within the published vintage.
#[must_use]
pub fn natural_key_unique(frame: &Frame, contract: &SchemaContract) -> ValidationReport {
    let mut report = ValidationReport::new(
        "business.natural_key_unique",
        "Natural keys are unique within the vintage",
        Severity::Block,
        1.0,
    );
    let indices: Vec<usize> = contract
        .natural_keys
        .iter()
        .filter_map(|k| frame.column_index(k))
        .collect();
    if indices.is_empty() {
        return report.finish();
    }

    let mut seen: BTreeMap<Vec<String>, usize> = BTreeMap::new();
    for row in frame.rows() {
        let key: Vec<String> = indices
            .iter()
            .map(|&i| row[i].canonical_render(None, RoundingMode::HalfUp))
            .collect();
        *seen.entry(key).or_default() += 1;
    }
    for (key, count) in seen {
        if count == 1 {
            report.record_pass();
        } else {
            report.record_fail(format!("({}) x{count}", key.join(", ")));
        }
    }
    report.finish()
}

/// `effective_to >= effective_from` when both are present; a future
/// `effective_from` is unusual but allowed, so it only warns.
#[must_use]
pub fn effective_date_order(frame: &Frame, today: NaiveDate) -> ValidationReport {
    let mut report = ValidationReport::new(
        "business.effective_date_order",
        "Effective ranges are ordered; future starts warn",
        Severity::Block,
        1.0,
    );
    let Some(from_idx) = frame.column_index("effective_from") else {
        return report.finish();
    };
    let to_idx = frame.column_index("effective_to");

    for (row_id, row) in frame.rows().iter().enumerate() {
        let Value::Date(from) = &row[from_idx] else {
            report.record_pass();
            continue;
        };
        let mut ok = true;
        if let Some(to_idx) = to_idx {
            if let Value::Date(to) = &row[to_idx] {
                if to < from {
                    report.record_fail(format!("row {row_id}: effective_to {to} < effective_from {from}"));
                    ok = false;
                }
            }
        }
        if ok {
            if *from > today {
                report.record_warning(format!("row {row_id}: effective_from {from} is in the future"));
            } else {
                report.record_pass();
            }
        }
    }
    report.finish()
}

/// Payable RVU rows (status A, R, T) must carry a work RVU; an NA
/// indicator of `1` means the non-facility PE RVU does not apply and
/// should be null.
#[must_use]
pub fn rvu_status_rules(frame: &Frame) -> ValidationReport {
    let mut report = ValidationReport::new(
        "business.rvu_status_rules",
        "Payable statuses carry work RVUs; NA rows have no non-facility PE",
        Severity::Block,
        1.0,
    );
    let (Some(status_idx), Some(work_idx)) = (
        frame.column_index("status_code"),
        frame.column_index("work_rvu"),
    ) else {
        return report.finish();
    };
    let na_idx = frame.column_index("na_indicator");
    let pe_nonfac_idx = frame.column_index("pe_rvu_nonfac");

    for (row_id, row) in frame.rows().iter().enumerate() {
        let payable = matches!(&row[status_idx], Value::Str(s) if s == "A" || s == "R" || s == "T");
        if payable && row[work_idx].is_null() {
            report.record_fail(format!("row {row_id}: payable status without work_rvu"));
            continue;
        }
        report.record_pass();

        if let (Some(na_idx), Some(pe_idx)) = (na_idx, pe_nonfac_idx) {
            let na_set = matches!(&row[na_idx], Value::Str(s) if s == "1");
            if na_set && !row[pe_idx].is_null() {
                report.record_warning(format!(
                    "row {row_id}: NA indicator set but pe_rvu_nonfac present"
                ));
            }
        }
    }
    report.finish()
}
