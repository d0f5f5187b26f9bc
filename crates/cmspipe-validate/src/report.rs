use serde::Serialize;

use cmspipe_types::Severity;

/// Most sample failures carried per report.
const MAX_SAMPLES: usize = 5;

/// Outcome of one validation rule over one frame.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub rule_name: String,
    pub description: String,
    pub severity: Severity,
    pub passed: usize,
    pub failed: usize,
    pub warnings: usize,
    /// Share of rows that satisfied the rule, in [0, 1].
    pub quality_score: f64,
    pub threshold: f64,
    pub sample_failures: Vec<String>,
}

impl ValidationReport {
    #[must_use]
    pub fn new(rule_name: &str, description: &str, severity: Severity, threshold: f64) -> Self {
        Self {
            rule_name: rule_name.to_string(),
            description: description.to_string(),
            severity,
            passed: 0,
            failed: 0,
            warnings: 0,
            quality_score: 1.0,
            threshold,
            sample_failures: Vec::new(),
        }
    }

    pub fn record_pass(&mut self) {
        self.passed += 1;
    }

    pub fn record_fail(&mut self, sample: impl Into<String>) {
        self.failed += 1;
        if self.sample_failures.len() < MAX_SAMPLES {
            self.sample_failures.push(sample.into());
        }
    }

    pub fn record_warning(&mut self, sample: impl Into<String>) {
        self.warnings += 1;
        if self.sample_failures.len() < MAX_SAMPLES {
            self.sample_failures.push(sample.into());
        }
    }

    /// Compute the final score. Warnings cost half a failure.
    #[must_use]
    pub fn finish(mut self) -> Self {
        let total = self.passed + self.failed + self.warnings;
        self.quality_score = if total == 0 {
            1.0
        } else {
            (self.passed as f64 + 0.5 * self.warnings as f64) / total as f64
        };
        self
    }

    #[must_use]
    pub fn is_block_failure(&self) -> bool {
        self.severity == Severity::Block && self.failed > 0
    }
}

/// Aggregate of every rule run against a dataset.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationSummary {
    pub reports: Vec<ValidationReport>,
    /// Mean of the rule quality scores.
    pub overall_score: f64,
    /// False when any BLOCK rule recorded a failure.
    pub overall_passed: bool,
}

/// Overall quality is the mean of rule scores; a BLOCK failure fails
/// the dataset no matter how good the mean looks.
#[must_use]
pub fn aggregate(reports: &[ValidationReport]) -> ValidationSummary {
    let overall_score = if reports.is_empty() {
        1.0
    } else {
        reports.iter().map(|r| r.quality_score).sum::<f64>() / reports.len() as f64
    };
    let overall_passed = !reports.iter().any(ValidationReport::is_block_failure);
    ValidationSummary {
        reports: reports.to_vec(),
        overall_score,
        overall_passed,
    }
}
