//! Observability: the five pillars and the alert rule engine.
//!
//! Freshness, volume, schema, quality, and lineage are each a set of
//! metrics with a health status; the weighted mean gives the overall
//! health score. The alert engine evaluates declarative rules over
//! the most recent runs plus the latest metrics, with per-rule
//! cooldowns so a known-bad dataset does not page every minute.

pub mod alerts;
pub mod anomaly;
pub mod pillars;

pub use alerts::{Alert, AlertEngine, AlertRule};
pub use anomaly::{Anomaly, AnomalySeverity};
pub use pillars::{
    DatasetExpectation, ObservabilityCollector, ObservabilityMetric, ObservabilityReport,
};
