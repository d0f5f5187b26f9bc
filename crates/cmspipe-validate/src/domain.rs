//! Domain rules: pattern conformance for coded columns.

use std::collections::HashMap;

use regex::Regex;

use cmspipe_kit::frame::Frame;
use cmspipe_schema::SchemaContract;
use cmspipe_types::{Severity, Value};

use crate::report::ValidationReport;

/// Every string cell in a pattern-bearing column must match its
/// anchored regex (`^\d{5}$` for ZIP5, `^\d{9}$` for ZIP9,
/// `^\d+$` for locality codes, and so on).
#[must_use]
pub fn pattern_rules(frame: &Frame, contract: &SchemaContract) -> ValidationReport {
    let mut report = ValidationReport::new(
        "domain.patterns",
        "Coded columns match their declared patterns",
        Severity::Block,
        1.0,
    );

    let mut compiled: HashMap<&str, Regex> = HashMap::new();
    for spec in &contract.columns {
        if let Some(pattern) = &spec.pattern {
            if let Ok(re) = Regex::new(pattern) {
                compiled.insert(spec.name.as_str(), re);
            }
        }
    }

    for (name, re) in &compiled {
        let Some(idx) = frame.column_index(name) else {
            continue;
        };
        for (row_id, row) in frame.rows().iter().enumerate() {
            match &row[idx] {
                Value::Str(s) => {
                    if re.is_match(s) {
                        report.record_pass();
                    } else {
                        report.record_fail(format!("row {row_id} {name}={s:?}"));
                    }
                }
                _ => report.record_pass(),
            }
        }
    }
    report.finish()
}
