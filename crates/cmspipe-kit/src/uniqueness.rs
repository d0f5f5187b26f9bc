//! Natural-key uniqueness enforcement.

use std::collections::BTreeMap;

use cmspipe_schema::SchemaContract;
use cmspipe_types::{ParseError, RoundingMode, Severity, Value};

use crate::frame::{Frame, RejectFrame};

/// Most duplicate key tuples carried as evidence on a BLOCK failure.
const MAX_DUPLICATE_SAMPLES: usize = 5;

fn key_tuple(row: &[Value], frame: &Frame, contract: &SchemaContract) -> Vec<String> {
    contract
        .natural_keys
        .iter()
        .map(|name| match frame.column_index(name) {
            Some(idx) => row[idx].canonical_render(None, RoundingMode::HalfUp),
            None => String::new(),
        })
        .collect()
}

/// Enforce the contract's natural-key uniqueness.
///
/// With BLOCK severity, any duplicate raises [`ParseError::DuplicateKey`]
/// carrying up to five sample tuples. With WARN severity, the first
/// occurrence (by original position) of each key stays in the data and
/// later occurrences move to the reject frame, ordered
/// lexicographically by key then by original position.
pub fn check_natural_keys(
    frame: &mut Frame,
    contract: &SchemaContract,
    severity: Severity,
    rejects: &mut RejectFrame,
) -> Result<(), ParseError> {
    if contract.natural_keys.is_empty() {
        return Ok(());
    }

    let mut by_key: BTreeMap<Vec<String>, Vec<usize>> = BTreeMap::new();
    for (row_id, row) in frame.rows().iter().enumerate() {
        by_key
            .entry(key_tuple(row, frame, contract))
            .or_default()
            .push(row_id);
    }

    let duplicates: Vec<(&Vec<String>, &Vec<usize>)> =
        by_key.iter().filter(|(_, ids)| ids.len() > 1).collect();
    if duplicates.is_empty() {
        return Ok(());
    }

    match severity {
        Severity::Block => {
            let samples: Vec<String> = duplicates
                .iter()
                .take(MAX_DUPLICATE_SAMPLES)
                .map(|(key, _)| format!("({})", key.join(", ")))
                .collect();
            Err(ParseError::DuplicateKey {
                schema_id: contract.schema_id(),
                duplicate_count: duplicates.len(),
                samples,
            })
        }
        Severity::Warn | Severity::Info => {
            // Later occurrences of each key are rejected; the BTreeMap
            // iteration makes the reject order lexicographic by key.
            let mut to_reject: Vec<(usize, String)> = Vec::new();
            for (key, ids) in duplicates {
                for id in ids.iter().skip(1) {
                    to_reject.push((*id, format!("({})", key.join(", "))));
                }
            }
            let reject_map: BTreeMap<usize, String> = to_reject.iter().cloned().collect();
            let removed = frame.drain_failing(|id, _| !reject_map.contains_key(&id));
            let mut removed_by_id: BTreeMap<usize, Vec<Value>> = removed.into_iter().collect();
            for (row_id, key) in to_reject {
                if let Some(row) = removed_by_id.remove(&row_id) {
                    rejects.push(
                        row,
                        row_id,
                        "NATURAL_KEY_UNIQUE",
                        Severity::Warn,
                        format!("duplicate natural key {key}"),
                    );
                }
            }
            Ok(())
        }
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
            columns: vec![ColumnSpec::string("k", ""), ColumnSpec::string("v", "")],
            natural_keys: vec!["k".into()],
            column_order: vec!["k".into(), "v".into()],
        }
    }

    fn frame(rows: &[(&str, &str)]) -> Frame {
        let mut f = Frame::new(vec!["k".into(), "v".into()]);
        for (k, v) in rows {
            f.push_row(vec![Value::Str((*k).into()), Value::Str((*v).into())])
                .unwrap();
        }
        f
    }

    #[test]
    fn unique_keys_pass() {
        let c = contract();
        let mut f = frame(&[("a", "1"), ("b", "2")]);
        let mut rejects = RejectFrame::new(f.columns().to_vec());
        assert!(check_natural_keys(&mut f, &c, Severity::Block, &mut rejects).is_ok());
        assert_eq!(f.len(), 2);
    }

    #[test]
    fn block_raises_with_samples() {
        let c = contract();
        let mut f = frame(&[("a", "1"), ("a", "2"), ("b", "3"), ("b", "4")]);
        let mut rejects = RejectFrame::new(f.columns().to_vec());
        let err = check_natural_keys(&mut f, &c, Severity::Block, &mut rejects).unwrap_err();
        match err {
            ParseError::DuplicateKey {
                duplicate_count,
                samples,
                ..
            } => {
                assert_eq!(duplicate_count, 2);
                assert_eq!(samples, vec!["(a)", "(b)"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn warn_keeps_first_occurrence() {
        let c = contract();
        let mut f = frame(&[("b", "first-b"), ("a", "first-a"), ("b", "second-b")]);
        let mut rejects = RejectFrame::new(f.columns().to_vec());
        check_natural_keys(&mut f, &c, Severity::Warn, &mut rejects).unwrap();
        assert_eq!(f.len(), 2);
        assert_eq!(rejects.len(), 1);
        assert_eq!(rejects.rejects[0].row_id, 2);
        assert_eq!(rejects.rejects[0].rule_id, "NATURAL_KEY_UNIQUE");
    }
}
