//! Statistical anomaly detection over published frames.
//!
//! Parsers enforce hard bounds row by row; this pass looks at the
//! distribution instead. A value more than three standard deviations
//! from its column mean is worth a human look even when it is
//! perfectly legal, and a frame whose row count collapses against
//! its history usually means the upstream file was truncated.

use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use cmspipe_kit::frame::Frame;
use cmspipe_types::Value;

/// Values this many standard deviations from the mean are outliers.
const OUTLIER_SIGMA: f64 = 3.0;

/// Anomaly severity, worst first when sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AnomalySeverity {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// One detected anomaly.
#[derive(Debug, Clone, Serialize)]
pub struct Anomaly {
    pub dataset: String,
    pub severity: AnomalySeverity,
    pub description: String,
    pub observed: String,
    pub expected: String,
}

fn decimal_column(frame: &Frame, column: &str) -> Vec<f64> {
    let Some(idx) = frame.column_index(column) else {
        return Vec::new();
    };
    frame
        .rows()
        .iter()
        .filter_map(|row| match &row[idx] {
            Value::Dec(d) => d.to_f64(),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        })
        .collect()
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0).max(1.0);
    (mean, variance.sqrt())
}

/// Flag values beyond [`OUTLIER_SIGMA`] from the column mean.
#[must_use]
pub fn detect_column_outliers(frame: &Frame, dataset: &str, column: &str) -> Vec<Anomaly> {
    let values = decimal_column(frame, column);
    if values.len() < 3 {
        return Vec::new();
    }
    let (mean, std) = mean_std(&values);
    if std == 0.0 {
        return Vec::new();
    }
    let outliers: Vec<f64> = values
        .iter()
        .copied()
        .filter(|v| (v - mean).abs() > OUTLIER_SIGMA * std)
        .collect();
    if outliers.is_empty() {
        return Vec::new();
    }
    vec![Anomaly {
        dataset: dataset.to_string(),
        severity: AnomalySeverity::Medium,
        description: format!(
            "{} value(s) in {column} beyond {OUTLIER_SIGMA} standard deviations",
            outliers.len()
        ),
        observed: format!("{outliers:.3?}"),
        expected: format!("{mean:.3} ± {:.3}", OUTLIER_SIGMA * std),
    }]
}

/// Compare the current row count against prior publications of the
/// same dataset. A collapse below half the historical median is
/// critical; a drop below the historical minimum is high.
#[must_use]
pub fn detect_volume_anomaly(
    dataset: &str,
    current_rows: usize,
    historical_rows: &[usize],
) -> Option<Anomaly> {
    if historical_rows.is_empty() {
        return None;
    }
    let mut sorted = historical_rows.to_vec();
    sorted.sort_unstable();
    let median = sorted[sorted.len() / 2];
    let minimum = sorted[0];

    if current_rows * 2 < median {
        return Some(Anomaly {
            dataset: dataset.to_string(),
            severity: AnomalySeverity::Critical,
            description: "row count collapsed below half the historical median".to_string(),
            observed: current_rows.to_string(),
            expected: format!("~{median}"),
        });
    }
    if current_rows < minimum {
        return Some(Anomaly {
            dataset: dataset.to_string(),
            severity: AnomalySeverity::High,
            description: "row count below the historical minimum".to_string(),
            observed: current_rows.to_string(),
            expected: format!(">= {minimum}"),
        });
    }
    None
}

/// Sort anomalies worst first.
pub fn sort_by_severity(anomalies: &mut [Anomaly]) {
    anomalies.sort_by(|a, b| b.severity.cmp(&a.severity));
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn frame_with_values(values: &[&str]) -> Frame {
        let mut f = Frame::new(vec!["work_rvu".into()]);
        for v in values {
            f.push_row(vec![Value::Dec(Decimal::from_str(v).unwrap())])
                .unwrap();
        }
        f
    }

    #[test]
    fn tight_distribution_has_no_outliers() {
        let f = frame_with_values(&["1.00", "1.10", "0.95", "1.05", "1.02"]);
        assert!(detect_column_outliers(&f, "pprrvu", "work_rvu").is_empty());
    }

    #[test]
    fn extreme_value_is_flagged() {
        let f = frame_with_values(&[
            "1.00", "1.10", "0.95", "1.05", "1.02", "1.07", "0.99", "1.03", "250.00",
        ]);
        let anomalies = detect_column_outliers(&f, "pprrvu", "work_rvu");
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].severity, AnomalySeverity::Medium);
    }

    #[test]
    fn volume_collapse_is_critical() {
        let anomaly = detect_volume_anomaly("zip5_locality", 10_000, &[42_000, 43_000, 41_500]);
        assert_eq!(anomaly.unwrap().severity, AnomalySeverity::Critical);
    }

    #[test]
    fn modest_dip_is_high_not_critical() {
        let anomaly = detect_volume_anomaly("gpci", 100, &[109, 112, 110]);
        assert_eq!(anomaly.unwrap().severity, AnomalySeverity::High);
    }

    #[test]
    fn normal_volume_passes() {
        assert!(detect_volume_anomaly("gpci", 110, &[109, 112, 110]).is_none());
    }

    #[test]
    fn severity_sort_is_worst_first() {
        let mut anomalies = vec![
            Anomaly {
                dataset: "a".into(),
                severity: AnomalySeverity::Low,
                description: String::new(),
                observed: String::new(),
                expected: String::new(),
            },
            Anomaly {
                dataset: "b".into(),
                severity: AnomalySeverity::Critical,
                description: String::new(),
                observed: String::new(),
                expected: String::new(),
            },
        ];
        sort_by_severity(&mut anomalies);
        assert_eq!(anomalies[0].severity, AnomalySeverity::Critical);
    }
}
