//! Cross-dataset consistency between the ZIP9 overrides and the ZIP5
//! locality table.

use std::collections::HashMap;

use cmspipe_kit::frame::Frame;
use cmspipe_types::{Severity, Value};

use crate::report::ValidationReport;

/// Every ZIP9 override range should agree with the ZIP5 locality row
/// for its five-digit prefix: same state, and ideally a known ZIP5.
/// Disagreement warns; a prefix with no ZIP5 row at all also warns
/// (the override may simply predate the quarterly ZIP5 refresh).
#[must_use]
pub fn zip9_zip5_consistency(zip9: &Frame, zip5: &Frame) -> ValidationReport {
    let mut report = ValidationReport::new(
        "cross.zip9_zip5_consistency",
        "ZIP9 override ranges agree with the ZIP5 locality table",
        Severity::Warn,
        0.95,
    );

    let (Some(z5_zip_idx), Some(z5_state_idx)) =
        (zip5.column_index("zip5"), zip5.column_index("state"))
    else {
        return report.finish();
    };
    let mut zip5_states: HashMap<&str, &str> = HashMap::new();
    for row in zip5.rows() {
        if let (Value::Str(zip), Value::Str(state)) = (&row[z5_zip_idx], &row[z5_state_idx]) {
            zip5_states.insert(zip.as_str(), state.as_str());
        }
    }

    let (Some(low_idx), Some(state_idx)) =
        (zip9.column_index("zip9_low"), zip9.column_index("state"))
    else {
        return report.finish();
    };

    for (row_id, row) in zip9.rows().iter().enumerate() {
        let (Value::Str(low), Value::Str(state)) = (&row[low_idx], &row[state_idx]) else {
            report.record_pass();
            continue;
        };
        let prefix = &low[..low.len().min(5)];
        match zip5_states.get(prefix) {
            Some(zip5_state) if *zip5_state == state.as_str() => report.record_pass(),
            Some(zip5_state) => report.record_warning(format!(
                "row {row_id}: override {prefix} says {state} but ZIP5 table says {zip5_state}"
            )),
            None => report.record_warning(format!(
                "row {row_id}: override prefix {prefix} has no ZIP5 locality row"
            )),
        }
    }
    report.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zip5_frame(rows: &[(&str, &str)]) -> Frame {
        let mut f = Frame::new(vec!["zip5".into(), "state".into()]);
        for (zip, state) in rows {
            f.push_row(vec![Value::Str((*zip).into()), Value::Str((*state).into())])
                .unwrap();
        }
        f
    }

    fn zip9_frame(rows: &[(&str, &str)]) -> Frame {
        let mut f = Frame::new(vec!["zip9_low".into(), "state".into()]);
        for (low, state) in rows {
            f.push_row(vec![Value::Str((*low).into()), Value::Str((*state).into())])
                .unwrap();
        }
        f
    }

    #[test]
    fn agreement_passes() {
        let report = zip9_zip5_consistency(
            &zip9_frame(&[("941071000", "CA")]),
            &zip5_frame(&[("94107", "CA")]),
        );
        assert_eq!(report.passed, 1);
        assert_eq!(report.warnings, 0);
    }

    #[test]
    fn state_conflict_warns() {
        let report = zip9_zip5_consistency(
            &zip9_frame(&[("941071000", "NV")]),
            &zip5_frame(&[("94107", "CA")]),
        );
        assert_eq!(report.warnings, 1);
    }

    #[test]
    fn unknown_prefix_warns() {
        let report = zip9_zip5_consistency(
            &zip9_frame(&[("999990000", "CA")]),
            &zip5_frame(&[("94107", "CA")]),
        );
        assert_eq!(report.warnings, 1);
    }
}
