//! Categorical domain enforcement.

use std::collections::BTreeSet;

use cmspipe_schema::SchemaContract;
use cmspipe_types::{Severity, Value};

use crate::frame::{Frame, RejectFrame};
use crate::metrics::ParseMetrics;

/// Enforce every domain the contract declares.
///
/// Domains are case-sensitive and checked after string normalization.
/// Rows holding a BLOCK-severity violation move to the reject frame
/// with rule id `CATEGORY_<COL>_DOMAIN`; WARN-severity violations stay
/// in the data and are counted in the metrics.
pub fn enforce_domains(
    frame: &mut Frame,
    contract: &SchemaContract,
    rejects: &mut RejectFrame,
    metrics: &mut ParseMetrics,
) {
    for spec in &contract.columns {
        let Some(domain) = &spec.domain else {
            continue;
        };
        let Some(idx) = frame.column_index(&spec.name) else {
            continue;
        };
        let allowed: BTreeSet<&str> = domain.iter().map(String::as_str).collect();
        let rule_id = format!("CATEGORY_{}_DOMAIN", spec.name.to_uppercase());

        match spec.domain_severity {
            Severity::Block => {
                let mut bad: Vec<(usize, String)> = Vec::new();
                for (row_id, row) in frame.rows().iter().enumerate() {
                    if let Value::Str(s) = &row[idx] {
                        if !allowed.contains(s.as_str()) {
                            bad.push((row_id, s.clone()));
                        }
                    }
                }
                if bad.is_empty() {
                    continue;
                }
                let bad_map: std::collections::BTreeMap<usize, String> = bad.into_iter().collect();
                let removed = frame.drain_failing(|id, _| !bad_map.contains_key(&id));
                for (row_id, row) in removed {
                    let value = bad_map.get(&row_id).cloned().unwrap_or_default();
                    rejects.push(
                        row,
                        row_id,
                        rule_id.clone(),
                        Severity::Block,
                        format!("value {value:?} outside domain for {}", spec.name),
                    );
                }
            }
            Severity::Warn | Severity::Info => {
                let mut warn_count = 0usize;
                for row in frame.rows() {
                    if let Value::Str(s) = &row[idx] {
                        if !allowed.contains(s.as_str()) {
                            warn_count += 1;
                        }
                    }
                }
                if warn_count > 0 {
                    metrics.record(
                        &format!("domain_warn_{}", spec.name),
                        serde_json::json!(warn_count),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmspipe_schema::ColumnSpec;

    fn contract(severity: Severity) -> SchemaContract {
        SchemaContract {
            dataset: "t".into(),
            major: 1,
            minor: 0,
            description: String::new(),
            source: String::new(),
            classification: "public".into(),
            license: "public-domain".into(),
            attribution_required: false,
            columns: vec![ColumnSpec::string("cf_type", "")
                .with_domain(&["physician", "anesthesia"])
                .with_domain_severity(severity)],
            natural_keys: vec!["cf_type".into()],
            column_order: vec!["cf_type".into()],
        }
    }

    #[test]
    fn block_moves_rows_to_rejects() {
        let c = contract(Severity::Block);
        let mut f = Frame::new(vec!["cf_type".into()]);
        for s in ["physician", "dental", "anesthesia"] {
            f.push_row(vec![Value::Str(s.into())]).unwrap();
        }
        let mut rejects = RejectFrame::new(f.columns().to_vec());
        let mut metrics = ParseMetrics::default();
        enforce_domains(&mut f, &c, &mut rejects, &mut metrics);
        assert_eq!(f.len(), 2);
        assert_eq!(rejects.len(), 1);
        assert_eq!(rejects.rejects[0].rule_id, "CATEGORY_CF_TYPE_DOMAIN");
        assert_eq!(rejects.rejects[0].row_id, 1);
    }

    #[test]
    fn warn_keeps_rows_and_counts() {
        let c = contract(Severity::Warn);
        let mut f = Frame::new(vec!["cf_type".into()]);
        f.push_row(vec![Value::Str("dental".into())]).unwrap();
        let mut rejects = RejectFrame::new(f.columns().to_vec());
        let mut metrics = ParseMetrics::default();
        enforce_domains(&mut f, &c, &mut rejects, &mut metrics);
        assert_eq!(f.len(), 1);
        assert!(rejects.is_empty());
        assert_eq!(metrics.extra["domain_warn_cf_type"], 1);
    }

    #[test]
    fn domain_is_case_sensitive() {
        let c = contract(Severity::Block);
        let mut f = Frame::new(vec!["cf_type".into()]);
        f.push_row(vec![Value::Str("Physician".into())]).unwrap();
        let mut rejects = RejectFrame::new(f.columns().to_vec());
        let mut metrics = ParseMetrics::default();
        enforce_domains(&mut f, &c, &mut rejects, &mut metrics);
        assert_eq!(f.len(), 0);
        assert_eq!(rejects.len(), 1);
    }
}
