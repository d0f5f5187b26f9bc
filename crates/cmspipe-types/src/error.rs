use thiserror::Error;

/// Library-level error type for pipeline operations.
///
/// Every fatal condition a stage can hit is a variant here; the
/// orchestrator translates the variant into a terminal batch status
/// plus an `error_type` string recorded on the run. WARN-severity
/// validation findings are never errors; they travel with the data
/// as reject rows and quality deductions.
///
/// | Kind | Batch effect | Retried |
/// |------|--------------|---------|
/// | `Input` | surfaced to the caller | never |
/// | `Source` | failed | never |
/// | `Transport` | failed after budget | bounded, Land only |
/// | `Parse` | failed | never |
/// | `Referential` | warning unless sole output | never |
/// | `Resolver` | surfaced to the caller | never |
/// | `Store` | failed | never |
/// | `Internal` | failed | never |
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("input error: {0}")]
    Input(#[from] InputError),

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("referential error: {0}")]
    Referential(#[from] ReferentialError),

    #[error("resolver error: {0}")]
    Resolver(#[from] ResolverError),

    #[error("run-metadata store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("validation failed at BLOCK severity: {detail}")]
    ValidationFailed { detail: String },

    #[error("batch exceeded processing time budget of {budget_hours} hours")]
    TimeBudgetExceeded { budget_hours: f64 },

    #[error("batch was cancelled during {stage}")]
    Cancelled { stage: String },

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Stable classification string recorded on the batch record and
    /// read by the observability layer.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Input(_) => "input_error",
            Self::Source(_) => "source_error",
            Self::Transport(_) => "transport_error",
            Self::Parse(ParseError::Encoding { .. }) => "encoding_error",
            Self::Parse(ParseError::LayoutMismatch { .. }) => "layout_mismatch_error",
            Self::Parse(ParseError::DuplicateKey { .. }) => "duplicate_key_error",
            Self::Parse(ParseError::CategoryValidation { .. }) => "category_validation_error",
            Self::Parse(ParseError::SchemaRegression { .. }) => "schema_regression_error",
            Self::Parse(_) => "parse_error",
            Self::Referential(_) => "referential_error",
            Self::Resolver(_) => "resolver_error",
            Self::Store(_) => "store_error",
            Self::Io(_) => "io_error",
            Self::ValidationFailed { .. } => "validation_error",
            Self::TimeBudgetExceeded { .. } => "time_budget_exceeded",
            Self::Cancelled { .. } => "cancelled",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Only transport faults are retried, and only inside the Land
    /// stage's bounded backoff loop.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

// Infrastructure helpers (atomic writes, canonical JSON) report
// through `anyhow`; a failure there is an internal fault from the
// pipeline's point of view.
impl From<anyhow::Error> for PipelineError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(format!("{e:#}"))
    }
}

/// Malformed caller input. Surfaced verbatim, never retried.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("unknown release: {release_id}")]
    UnknownRelease { release_id: String },

    #[error("unknown dataset: {dataset}")]
    UnknownDataset { dataset: String },

    #[error("invalid configuration value for {key}: {value}")]
    InvalidConfig { key: String, value: String },
}

/// Upstream source faults that are fatal to the batch.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("checksum mismatch for {filename}: expected {expected}, computed {actual}")]
    ChecksumMismatch {
        filename: String,
        expected: String,
        actual: String,
    },

    #[error("unreadable archive {filename}: {reason}")]
    ArchiveUnreadable { filename: String, reason: String },

    #[error("archive {archive} is missing expected member {member}")]
    MissingMember { archive: String, member: String },

    #[error("discovery produced no source files for release {release_id}")]
    EmptyRelease { release_id: String },
}

/// Network faults eligible for bounded retry.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request to {url} failed: {reason}")]
    Http { url: String, reason: String },

    #[error("request to {url} timed out after {seconds}s")]
    Timeout { url: String, seconds: u64 },

    #[error("retry budget exhausted for {url} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },
}

/// Typed parse failures. All are fatal to the batch and carry
/// structured evidence (bounded samples of offending rows).
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("encoding detection failed for {filename}: {reason}")]
    Encoding { filename: String, reason: String },

    #[error(
        "layout {layout_version} mismatch at line {line_number}: expected at least {expected_min} chars, got {actual}"
    )]
    LayoutMismatch {
        layout_version: String,
        line_number: usize,
        expected_min: usize,
        actual: usize,
    },

    #[error("{duplicate_count} duplicate natural key(s) in {schema_id}; first: {}", samples.first().map(String::as_str).unwrap_or("<none>"))]
    DuplicateKey {
        schema_id: String,
        duplicate_count: usize,
        samples: Vec<String>,
    },

    #[error("column {column} in {schema_id} holds values outside its domain: {invalid_values:?}")]
    CategoryValidation {
        schema_id: String,
        column: String,
        invalid_values: Vec<String>,
    },

    #[error("schema drift for {schema_id}: missing {missing:?}, unexpected {unexpected:?}")]
    SchemaRegression {
        schema_id: String,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("required metadata field {field} was not supplied")]
    MissingMetadata { field: &'static str },

    #[error("malformed {filename}: {reason}")]
    Malformed { filename: String, reason: String },
}

/// Cross-dataset inconsistencies. WARN unless the inconsistent rows
/// are the only output, in which case the caller escalates to BLOCK.
#[derive(Error, Debug)]
pub enum ReferentialError {
    #[error("{count} ZIP9 override range(s) have no ZIP5 locality row (e.g. {sample})")]
    Zip9WithoutZip5 { count: usize, sample: String },

    #[error("referential rule {rule} failed: {detail}")]
    Inconsistent { rule: String, detail: String },
}

/// Enumerated resolver failures, surfaced through the consumer
/// contract with stable codes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolverError {
    #[error("INVALID_ZIP: {input:?} is not a 5- or 9-digit ZIP")]
    InvalidZip { input: String },

    #[error("NO_STATE: no locality row for ZIP5 {zip5}")]
    NoState { zip5: String },

    #[error("NO_ZCTA: no crosswalk row for ZIP5 {zip5}")]
    NoZcta { zip5: String },

    #[error("NO_COORDS: no centroid for ZCTA {zcta5}")]
    NoCoords { zcta5: String },

    #[error("NO_CANDIDATES_IN_STATE: no candidate ZIP5s in state {state}")]
    NoCandidatesInState { state: String },
}

impl ResolverError {
    /// Stable error code per the consumer contract.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidZip { .. } => "INVALID_ZIP",
            Self::NoState { .. } => "NO_STATE",
            Self::NoZcta { .. } => "NO_ZCTA",
            Self::NoCoords { .. } => "NO_COORDS",
            Self::NoCandidatesInState { .. } => "NO_CANDIDATES_IN_STATE",
        }
    }
}

/// Run-metadata store faults.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("no run found for batch {batch_id}")]
    RunNotFound { batch_id: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_type_is_stable_per_parse_subtype() {
        let dup = PipelineError::Parse(ParseError::DuplicateKey {
            schema_id: "gpci_v1.0".into(),
            duplicate_count: 2,
            samples: vec!["(01, 2025-01-01)".into()],
        });
        assert_eq!(dup.error_type(), "duplicate_key_error");

        let enc = PipelineError::Parse(ParseError::Encoding {
            filename: "GPCI2025.txt".into(),
            reason: "not UTF-8".into(),
        });
        assert_eq!(enc.error_type(), "encoding_error");
    }

    #[test]
    fn only_transport_is_retryable() {
        let t = PipelineError::Transport(TransportError::Timeout {
            url: "https://cms.gov/x".into(),
            seconds: 30,
        });
        assert!(t.is_retryable());

        let s = PipelineError::Source(SourceError::HttpStatus {
            url: "https://cms.gov/x".into(),
            status: 404,
        });
        assert!(!s.is_retryable());
    }

    #[test]
    fn resolver_codes_match_contract() {
        assert_eq!(
            ResolverError::InvalidZip { input: "12".into() }.code(),
            "INVALID_ZIP"
        );
        assert_eq!(
            ResolverError::NoCandidatesInState { state: "CA".into() }.code(),
            "NO_CANDIDATES_IN_STATE"
        );
    }
}
