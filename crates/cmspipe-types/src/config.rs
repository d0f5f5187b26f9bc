use std::fs;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// Pipeline configuration.
///
/// Loaded from a TOML file or constructed with [`PipelineConfig::default`];
/// every field has a production default so a bare `[pipeline]` table is
/// valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root of the on-disk artifact layout (raw/, stage/, curated/,
    /// quarantine/, manifests/).
    pub output_dir: Utf8PathBuf,
    /// SQLite database holding run metadata and alerts.
    pub database_path: Utf8PathBuf,
    /// Optional directory of reference tables (FIPS, gazetteer).
    pub reference_dir: Option<Utf8PathBuf>,

    /// Per-request HTTP timeout in seconds.
    pub http_timeout_secs: u64,
    /// Fetch attempts per source file (first try included).
    pub fetch_attempts: u32,
    /// Initial backoff in seconds; doubles per attempt.
    pub fetch_backoff_initial_secs: u64,
    /// Maximum source files fetched concurrently.
    pub fetch_parallelism: usize,

    /// Absolute batch clock; exceeding it fails the batch.
    pub max_processing_time_hours: f64,

    /// Overall quality threshold.
    pub quality_threshold: f64,
    /// Critical-column completeness threshold.
    pub completeness_threshold: f64,
    /// Grace period beyond expected cadence before freshness turns
    /// critical.
    pub freshness_grace_hours: i64,
    /// Tolerated relative volume deviation.
    pub volume_tolerance: f64,

    /// Enable fuzzy county-name matching in the FIPS normalizer.
    pub use_fuzzy_county_match: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: Utf8PathBuf::from("data/cms"),
            database_path: Utf8PathBuf::from("data/cms/cmspipe.db"),
            reference_dir: None,
            http_timeout_secs: 30,
            fetch_attempts: 3,
            fetch_backoff_initial_secs: 1,
            fetch_parallelism: 4,
            max_processing_time_hours: 2.0,
            quality_threshold: 0.95,
            completeness_threshold: 0.99,
            freshness_grace_hours: 72,
            volume_tolerance: 0.15,
            use_fuzzy_county_match: true,
        }
    }
}

/// Wrapper table so config files read `[pipeline]`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    pipeline: PipelineConfig,
}

impl PipelineConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let file: ConfigFile =
            toml::from_str(&raw).with_context(|| format!("Invalid config file: {path}"))?;
        Ok(file.pipeline)
    }

    /// Batch clock as a duration.
    #[must_use]
    pub fn time_budget(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.max_processing_time_hours * 3600.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let c = PipelineConfig::default();
        assert_eq!(c.http_timeout_secs, 30);
        assert_eq!(c.fetch_attempts, 3);
        assert_eq!(c.fetch_parallelism, 4);
        assert_eq!(c.max_processing_time_hours, 2.0);
        assert_eq!(c.quality_threshold, 0.95);
        assert_eq!(c.completeness_threshold, 0.99);
        assert_eq!(c.freshness_grace_hours, 72);
    }

    #[test]
    fn empty_table_is_valid() {
        let file: ConfigFile = toml::from_str("[pipeline]\n").unwrap();
        assert_eq!(file.pipeline.fetch_attempts, 3);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let file: ConfigFile =
            toml::from_str("[pipeline]\nfetch_attempts = 5\noutput_dir = \"/tmp/cms\"\n").unwrap();
        assert_eq!(file.pipeline.fetch_attempts, 5);
        assert_eq!(file.pipeline.output_dir, Utf8PathBuf::from("/tmp/cms"));
        assert_eq!(file.pipeline.http_timeout_secs, 30);
    }
}
