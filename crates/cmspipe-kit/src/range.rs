//! Numeric range enforcement: hard bounds reject, guardrails warn.

use rust_decimal::Decimal;

use cmspipe_types::{Severity, Value};

use crate::frame::{Frame, RejectFrame};
use crate::metrics::ParseMetrics;

/// Inclusive/exclusive bound for a range rule.
#[derive(Debug, Clone, Copy)]
pub enum Bound {
    Inclusive(Decimal),
    Exclusive(Decimal),
}

impl Bound {
    fn admits_low(&self, v: Decimal) -> bool {
        match self {
            Self::Inclusive(b) => v >= *b,
            Self::Exclusive(b) => v > *b,
        }
    }

    fn admits_high(&self, v: Decimal) -> bool {
        match self {
            Self::Inclusive(b) => v <= *b,
            Self::Exclusive(b) => v < *b,
        }
    }
}

/// Enforce a range over a decimal column.
///
/// BLOCK severity moves out-of-range rows to the reject frame and
/// bumps `range_reject_count`; WARN severity keeps the rows and
/// records a count under `range_warn_<col>`. Null cells pass.
pub fn enforce_range(
    frame: &mut Frame,
    rejects: &mut RejectFrame,
    metrics: &mut ParseMetrics,
    column: &str,
    low: Option<Bound>,
    high: Option<Bound>,
    severity: Severity,
    rule_id: &str,
) {
    let Some(idx) = frame.column_index(column) else {
        return;
    };

    let out_of_range = |row: &[Value]| -> bool {
        let Value::Dec(d) = &row[idx] else {
            return false;
        };
        let low_ok = low.map_or(true, |b| b.admits_low(*d));
        let high_ok = high.map_or(true, |b| b.admits_high(*d));
        !(low_ok && high_ok)
    };

    match severity {
        Severity::Block => {
            let removed = frame.drain_failing(|_, row| !out_of_range(row));
            metrics.range_reject_count += removed.len();
            for (row_id, row) in removed {
                let rendered = row[idx].to_string();
                rejects.push(
                    row,
                    row_id,
                    rule_id.to_string(),
                    Severity::Block,
                    format!("value {rendered} outside hard bounds for {column}"),
                );
            }
        }
        Severity::Warn | Severity::Info => {
            let count = frame.rows().iter().filter(|row| out_of_range(row)).count();
            if count > 0 {
                metrics.record(&format!("range_warn_{column}"), serde_json::json!(count));
            }
        }
    }
}
