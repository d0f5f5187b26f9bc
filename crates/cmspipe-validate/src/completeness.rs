//! Completeness: critical columns must be nearly fully populated.

use cmspipe_kit::frame::Frame;
use cmspipe_schema::SchemaContract;
use cmspipe_types::Severity;

use crate::report::ValidationReport;

/// Share of non-null cells required in every critical column.
pub const COMPLETENESS_THRESHOLD: f64 = 0.99;

/// Critical columns must be at least 99% non-null; shortfalls reduce
/// the quality score without rejecting rows.
#[must_use]
pub fn critical_columns(frame: &Frame, contract: &SchemaContract) -> ValidationReport {
    let mut report = ValidationReport::new(
        "completeness.critical_columns",
        "Critical columns are at least 99% non-null",
        Severity::Warn,
        COMPLETENESS_THRESHOLD,
    );
    if frame.is_empty() {
        return report.finish();
    }

    for name in contract.critical_columns() {
        let Some(idx) = frame.column_index(name) else {
            continue;
        };
        let non_null = frame.rows().iter().filter(|row| !row[idx].is_null()).count();
        let share = non_null as f64 / frame.len() as f64;
        if share >= COMPLETENESS_THRESHOLD {
            report.record_pass();
        } else {
            report.record_warning(format!(
                "column {name} is {:.1}% complete",
                share * 100.0
            ));
        }
    }
    report.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmspipe_schema::ColumnSpec;
    use cmspipe_types::Value;

    fn contract() -> SchemaContract {
        SchemaContract {
            dataset: "t".into(),
            major: 1,
            minor: 0,
            description: String::new(),
            source: String::new(),
            classification: "public".into(),
            license: "public-domain".into(),
            attribution_required: false,
            columns: vec![
                ColumnSpec::string("key", ""),
                ColumnSpec::string("note", "").nullable(),
            ],
            natural_keys: vec!["key".into()],
            column_order: vec!["key".into(), "note".into()],
        }
    }

    #[test]
    fn sparse_critical_column_warns() {
        let mut frame = Frame::new(vec!["key".into(), "note".into()]);
        frame
            .push_row(vec![Value::Str("a".into()), Value::Null])
            .unwrap();
        frame.push_row(vec![Value::Null, Value::Null]).unwrap();
        let report = critical_columns(&frame, &contract());
        assert_eq!(report.warnings, 1);
        assert!(report.quality_score < 1.0);
    }

    #[test]
    fn nullable_columns_are_exempt() {
        let mut frame = Frame::new(vec!["key".into(), "note".into()]);
        frame
            .push_row(vec![Value::Str("a".into()), Value::Null])
            .unwrap();
        let report = critical_columns(&frame, &contract());
        assert_eq!(report.warnings, 0);
        assert_eq!(report.passed, 1);
    }
}
