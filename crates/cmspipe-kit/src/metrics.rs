use std::collections::BTreeMap;

use serde::Serialize;

/// Metrics every parser emits alongside its frames.
///
/// `extra` carries parser-specific stats (for example
/// `row_count_by_cf_type`) as a stable, sorted map.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParseMetrics {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub reject_rows: usize,
    pub reject_rate: f64,
    pub encoding_detected: String,
    pub encoding_fallback: bool,
    pub parse_duration_sec: f64,
    pub parser_version: String,
    pub schema_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout_version: Option<String>,
    /// Leading rows skipped dynamically (headers, banners, short lines).
    pub skiprows_dynamic: usize,
    /// Rows rejected by hard range bounds.
    pub range_reject_count: usize,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ParseMetrics {
    #[must_use]
    pub fn new(parser_version: &str, schema_id: &str) -> Self {
        Self {
            parser_version: parser_version.to_string(),
            schema_id: schema_id.to_string(),
            ..Self::default()
        }
    }

    /// Record a parser-specific stat.
    pub fn record(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.extra.insert(key.to_string(), value.into());
    }

    /// Fill the row-count fields from final frame sizes.
    pub fn set_counts(&mut self, valid: usize, rejects: usize) {
        self.valid_rows = valid;
        self.reject_rows = rejects;
        self.reject_rate = if self.total_rows == 0 {
            0.0
        } else {
            rejects as f64 / self.total_rows as f64
        };
    }
}
