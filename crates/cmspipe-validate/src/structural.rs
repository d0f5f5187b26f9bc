//! Structural rules: required columns present, declared types hold.

use cmspipe_kit::frame::Frame;
use cmspipe_schema::{ColumnType, SchemaContract};
use cmspipe_types::{Severity, Value};

use crate::report::ValidationReport;

/// Every contract column must exist in the frame.
#[must_use]
pub fn required_columns(frame: &Frame, contract: &SchemaContract) -> ValidationReport {
    let mut report = ValidationReport::new(
        "structural.required_columns",
        "Every schema column is present in the frame",
        Severity::Block,
        1.0,
    );
    for spec in &contract.columns {
        if frame.column_index(&spec.name).is_some() {
            report.record_pass();
        } else {
            report.record_fail(format!("missing column {}", spec.name));
        }
    }
    report.finish()
}

fn value_matches(value: &Value, ty: ColumnType) -> bool {
    match value {
        Value::Null => true,
        Value::Str(_) => ty == ColumnType::String,
        Value::Int(_) => ty == ColumnType::Integer,
        Value::Dec(_) => ty == ColumnType::Float,
        Value::Bool(_) => ty == ColumnType::Boolean,
        Value::Date(_) => ty == ColumnType::Date,
    }
}

/// Every non-null cell carries the declared type. A frame that went
/// through the kit's cast can only fail this if a later step
/// mismanaged it, which is exactly why it is checked.
#[must_use]
pub fn types_coerce(frame: &Frame, contract: &SchemaContract) -> ValidationReport {
    let mut report = ValidationReport::new(
        "structural.types_coerce",
        "Every cell holds its column's declared type",
        Severity::Block,
        1.0,
    );
    for spec in &contract.columns {
        let Some(idx) = frame.column_index(&spec.name) else {
            continue;
        };
        for (row_id, row) in frame.rows().iter().enumerate() {
            if value_matches(&row[idx], spec.ty) {
                report.record_pass();
            } else {
                report.record_fail(format!(
                    "row {row_id} column {} holds {:?}, expected {}",
                    spec.name,
                    row[idx],
                    spec.ty.as_str()
                ));
            }
        }
    }
    report.finish()
}
