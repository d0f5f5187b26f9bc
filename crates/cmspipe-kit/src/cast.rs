//! Typed casting against the schema contract.
//!
//! Raw parses hold every cell as a string. Casting converts each
//! column to its declared type and canonicalizes numerics with exact
//! decimal arithmetic at the declared precision. Rows that fail to
//! cast move to the reject frame with a `TYPE_<COL>` rule id.

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use cmspipe_schema::{ColumnType, SchemaContract};
use cmspipe_types::{RoundingMode, Severity, Value};

use crate::frame::{Frame, RejectFrame};

/// Parse a decimal from a CMS-flavored numeric string: currency
/// symbols and thousands separators are tolerated.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|&c| c != '$' && c != ',')
        .collect();
    Decimal::from_str(&cleaned).ok()
}

/// Parse a date in ISO form, falling back to the `MM/DD/YYYY` CMS
/// spreadsheets sometimes use.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%m/%d/%Y"))
        .ok()
}

fn cast_cell(
    cell: &Value,
    ty: ColumnType,
    precision: Option<u32>,
    rounding: RoundingMode,
    nullable: bool,
) -> Result<Value, String> {
    let s = match cell {
        Value::Null => return Ok(Value::Null),
        Value::Str(s) => s.as_str(),
        // Already typed; re-round decimals so precision always applies.
        Value::Dec(d) => {
            return Ok(match precision {
                Some(p) => Value::Dec(Value::round_decimal(*d, p, rounding)),
                None => Value::Dec(*d),
            });
        }
        other => return Ok(other.clone()),
    };

    if s.is_empty() {
        return if nullable {
            Ok(Value::Null)
        } else {
            Err("empty value in non-nullable column".to_string())
        };
    }

    match ty {
        ColumnType::String => Ok(Value::Str(s.to_string())),
        ColumnType::Integer => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| format!("{s:?} is not an integer")),
        ColumnType::Float => match parse_decimal(s) {
            Some(d) => Ok(match precision {
                Some(p) => Value::Dec(Value::round_decimal(d, p, rounding)),
                None => Value::Dec(d),
            }),
            None => Err(format!("{s:?} is not a decimal number")),
        },
        ColumnType::Boolean => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "y" | "yes" => Ok(Value::Bool(true)),
            "false" | "f" | "0" | "n" | "no" => Ok(Value::Bool(false)),
            _ => Err(format!("{s:?} is not a boolean")),
        },
        ColumnType::Date => parse_date(s)
            .map(Value::Date)
            .ok_or_else(|| format!("{s:?} is not an ISO date")),
    }
}

/// Cast every contract column to its declared type, canonicalizing
/// numerics. Rows with any uncastable cell are moved to `rejects`.
pub fn cast_frame(frame: &mut Frame, contract: &SchemaContract, rejects: &mut RejectFrame) {
    let specs: Vec<(usize, _)> = contract
        .columns
        .iter()
        .filter_map(|spec| frame.column_index(&spec.name).map(|idx| (idx, spec)))
        .collect();

    let mut failures: Vec<(usize, String, String)> = Vec::new();
    {
        let mut row_id = 0usize;
        frame.map_rows(|row| {
            for (idx, spec) in &specs {
                let rounding = spec.rounding.unwrap_or(RoundingMode::HalfUp);
                match cast_cell(&row[*idx], spec.ty, spec.precision, rounding, spec.nullable) {
                    Ok(v) => row[*idx] = v,
                    Err(reason) => {
                        failures.push((row_id, spec.name.clone(), reason));
                        break;
                    }
                }
            }
            row_id += 1;
        });
    }

    if failures.is_empty() {
        return;
    }
    let failed_ids: std::collections::BTreeMap<usize, (String, String)> = failures
        .into_iter()
        .map(|(id, col, reason)| (id, (col, reason)))
        .collect();
    let removed = frame.drain_failing(|idx, _| !failed_ids.contains_key(&idx));
    for (idx, row) in removed {
        let (col, reason) = &failed_ids[&idx];
        rejects.push(
            row,
            idx,
            format!("TYPE_{}", col.to_uppercase()),
            Severity::Block,
            reason.clone(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmspipe_schema::ColumnSpec;

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
                ColumnSpec::string("name", ""),
                ColumnSpec::decimal("amount", "", 4),
                ColumnSpec::date("effective_from", ""),
            ],
            natural_keys: vec!["name".into()],
            column_order: vec!["name".into(), "amount".into(), "effective_from".into()],
        }
    }

    fn row(a: &str, b: &str, c: &str) -> Vec<Value> {
        vec![
            Value::Str(a.into()),
            Value::Str(b.into()),
            Value::Str(c.into()),
        ]
    }

    #[test]
    fn casts_and_rounds_currency() {
        let c = contract();
        let mut f = Frame::new(c.column_order.clone());
        f.push_row(row("physician", "$32.3465", "2025-01-01")).unwrap();
        let mut rejects = RejectFrame::new(f.columns().to_vec());
        cast_frame(&mut f, &c, &mut rejects);
        assert!(rejects.is_empty());
        match f.value(0, "amount").unwrap() {
            Value::Dec(d) => assert_eq!(d.to_string(), "32.3465"),
            other => panic!("expected decimal, got {other:?}"),
        }
        assert_eq!(
            f.value(0, "effective_from").unwrap(),
            &Value::Date(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
        );
    }

    #[test]
    fn uncastable_rows_move_to_rejects() {
        let c = contract();
        let mut f = Frame::new(c.column_order.clone());
        f.push_row(row("physician", "32.3465", "2025-01-01")).unwrap();
        f.push_row(row("anesthesia", "not-a-number", "2025-01-01"))
            .unwrap();
        let mut rejects = RejectFrame::new(f.columns().to_vec());
        cast_frame(&mut f, &c, &mut rejects);
        assert_eq!(f.len(), 1);
        assert_eq!(rejects.len(), 1);
        assert_eq!(rejects.rejects[0].rule_id, "TYPE_AMOUNT");
        assert_eq!(rejects.rejects[0].row_id, 1);
    }

    #[test]
    fn slash_dates_parse() {
        assert_eq!(
            parse_date("01/15/2025"),
            NaiveDate::from_ymd_opt(2025, 1, 15)
        );
    }
}
