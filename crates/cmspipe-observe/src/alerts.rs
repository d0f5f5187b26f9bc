//! Declarative alert rules with cooldown suppression.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use cmspipe_store::MetadataStore;
use cmspipe_types::{BatchRecord, HealthStatus, PipelineError, RunStatus, StoreError};

use crate::pillars::ObservabilityMetric;

const ALERTS_DDL: &str = "
CREATE TABLE IF NOT EXISTS alerts (
    alert_id     TEXT PRIMARY KEY,
    rule_id      TEXT NOT NULL,
    alert_type   TEXT NOT NULL,
    severity     TEXT NOT NULL,
    title        TEXT NOT NULL,
    description  TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    resolved     INTEGER NOT NULL DEFAULT 0,
    resolved_at  TEXT,
    metadata_json TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alerts_rule ON alerts(rule_id, created_at);
";

/// What a rule looks at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AlertCondition {
    /// Any recent run terminal with status `failed`.
    OverallStatusFailed,
    /// Total rejected rows across recent runs above the bound.
    TotalErrorsAbove(u64),
    /// Hours since the last terminal run above the bound.
    HoursSinceLastIngestionAbove(i64),
    /// Any pillar metric currently critical.
    AnomalySeverityCritical,
    /// Count of non-healthy metrics above the bound.
    AnomalyCountAbove(usize),
}

/// A declarative alert rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub rule_id: String,
    pub rule_name: String,
    pub alert_type: String,
    pub severity: String,
    pub condition: AlertCondition,
    pub cooldown_minutes: i64,
}

/// A fired alert, persisted until resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: String,
    pub rule_id: String,
    pub alert_type: String,
    pub severity: String,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

/// The default rule set.
#[must_use]
pub fn default_rules() -> Vec<AlertRule> {
    vec![
        AlertRule {
            rule_id: "ingestion_failure".into(),
            rule_name: "Ingestion Failure".into(),
            alert_type: "ingestion_failure".into(),
            severity: "critical".into(),
            condition: AlertCondition::OverallStatusFailed,
            cooldown_minutes: 30,
        },
        AlertRule {
            rule_id: "high_error_rate".into(),
            rule_name: "High Error Rate".into(),
            alert_type: "performance_degradation".into(),
            severity: "high".into(),
            condition: AlertCondition::TotalErrorsAbove(100),
            cooldown_minutes: 60,
        },
        AlertRule {
            rule_id: "critical_anomaly".into(),
            rule_name: "Critical Anomaly Detected".into(),
            alert_type: "anomaly_detected".into(),
            severity: "critical".into(),
            condition: AlertCondition::AnomalySeverityCritical,
            cooldown_minutes: 15,
        },
        AlertRule {
            rule_id: "high_anomaly_count".into(),
            rule_name: "High Anomaly Count".into(),
            alert_type: "anomaly_detected".into(),
            severity: "medium".into(),
            condition: AlertCondition::AnomalyCountAbove(50),
            cooldown_minutes: 120,
        },
        AlertRule {
            rule_id: "no_recent_ingestion".into(),
            rule_name: "No Recent Ingestion".into(),
            alert_type: "system_error".into(),
            severity: "high".into(),
            condition: AlertCondition::HoursSinceLastIngestionAbove(24),
            cooldown_minutes: 240,
        },
    ]
}

/// Evaluates rules and persists fired alerts.
pub struct AlertEngine {
    store: Arc<MetadataStore>,
    rules: Vec<AlertRule>,
}

impl AlertEngine {
    pub fn new(store: Arc<MetadataStore>) -> Result<Self, PipelineError> {
        store.with_connection(|conn| conn.execute_batch(ALERTS_DDL))?;
        Ok(Self {
            store,
            rules: default_rules(),
        })
    }

    #[must_use]
    pub fn with_rules(mut self, rules: Vec<AlertRule>) -> Self {
        self.rules = rules;
        self
    }

    /// Evaluate every rule against the recent runs and the latest
    /// metrics; fire and persist whatever is due. A rule in its
    /// cooldown window (an unresolved alert newer than the cooldown)
    /// does not re-fire.
    pub fn check_alerts(
        &self,
        metrics: &[ObservabilityMetric],
        now: DateTime<Utc>,
    ) -> Result<Vec<Alert>, PipelineError> {
        let recent = self.store.get_recent_runs(20)?;
        let mut fired = Vec::new();

        for rule in &self.rules {
            if self.in_cooldown(rule, now)? {
                continue;
            }
            if let Some(description) = evaluate(&rule.condition, &recent, metrics, now) {
                let alert = Alert {
                    alert_id: Uuid::new_v4().to_string(),
                    rule_id: rule.rule_id.clone(),
                    alert_type: rule.alert_type.clone(),
                    severity: rule.severity.clone(),
                    title: rule.rule_name.clone(),
                    description,
                    created_at: now,
                    resolved: false,
                    resolved_at: None,
                    metadata: serde_json::json!({
                        "recent_run_count": recent.len(),
                        "metric_count": metrics.len(),
                    }),
                };
                self.persist(&alert)?;
                info!(rule = %rule.rule_id, severity = %rule.severity, "alert fired");
                fired.push(alert);
            }
        }
        Ok(fired)
    }

    /// Unresolved alerts, newest first.
    pub fn active_alerts(&self) -> Result<Vec<Alert>, PipelineError> {
        let rows = self.store.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT alert_id, rule_id, alert_type, severity, title, description,
                        created_at, resolved, resolved_at, metadata_json
                 FROM alerts WHERE resolved = 0 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([], row_to_alert)?
                .collect::<Result<Vec<Alert>, _>>()?;
            Ok(rows)
        })?;
        Ok(rows)
    }

    /// Mark an alert resolved. Returns false when the id is unknown
    /// or already resolved.
    pub fn resolve_alert(&self, alert_id: &str) -> Result<bool, PipelineError> {
        let updated = self.store.with_connection(|conn| {
            conn.execute(
                "UPDATE alerts SET resolved = 1, resolved_at = ?2
                 WHERE alert_id = ?1 AND resolved = 0",
                params![alert_id, Utc::now().to_rfc3339()],
            )
        })?;
        Ok(updated > 0)
    }

    fn in_cooldown(&self, rule: &AlertRule, now: DateTime<Utc>) -> Result<bool, PipelineError> {
        let cutoff = (now - Duration::minutes(rule.cooldown_minutes)).to_rfc3339();
        let count = self.store.with_connection(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM alerts
                 WHERE rule_id = ?1 AND resolved = 0 AND created_at >= ?2",
                params![rule.rule_id, cutoff],
                |row| row.get::<_, i64>(0),
            )
        })?;
        Ok(count > 0)
    }

    fn persist(&self, alert: &Alert) -> Result<(), PipelineError> {
        let metadata = serde_json::to_string(&alert.metadata)
            .map_err(|e| PipelineError::Store(StoreError::Serialization(e.to_string())))?;
        self.store.with_connection(|conn| {
            conn.execute(
                "INSERT INTO alerts (
                    alert_id, rule_id, alert_type, severity, title, description,
                    created_at, resolved, resolved_at, metadata_json
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, NULL, ?8)",
                params![
                    alert.alert_id,
                    alert.rule_id,
                    alert.alert_type,
                    alert.severity,
                    alert.title,
                    alert.description,
                    alert.created_at.to_rfc3339(),
                    metadata,
                ],
            )
        })?;
        Ok(())
    }
}

fn row_to_alert(row: &rusqlite::Row<'_>) -> Result<Alert, rusqlite::Error> {
    let created_at: String = row.get(6)?;
    let resolved_at: Option<String> = row.get(8)?;
    let metadata_json: String = row.get(9)?;
    Ok(Alert {
        alert_id: row.get(0)?,
        rule_id: row.get(1)?,
        alert_type: row.get(2)?,
        severity: row.get(3)?,
        title: row.get(4)?,
        description: row.get(5)?,
        created_at: created_at
            .parse::<DateTime<Utc>>()
            .unwrap_or_else(|_| Utc::now()),
        resolved: row.get::<_, i64>(7)? != 0,
        resolved_at: resolved_at.and_then(|s| s.parse::<DateTime<Utc>>().ok()),
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
    })
}

fn evaluate(
    condition: &AlertCondition,
    recent: &[BatchRecord],
    metrics: &[ObservabilityMetric],
    now: DateTime<Utc>,
) -> Option<String> {
    match condition {
        AlertCondition::OverallStatusFailed => {
            let failed = recent.iter().find(|r| r.status == RunStatus::Failed)?;
            Some(format!(
                "run {} for {} failed: {}",
                failed.batch_id,
                failed.dataset_name,
                failed.error_message.as_deref().unwrap_or("no error message")
            ))
        }
        AlertCondition::TotalErrorsAbove(bound) => {
            let total: u64 = recent.iter().map(|r| r.rejected_row_count).sum();
            (total > *bound).then(|| format!("{total} rejected rows across recent runs"))
        }
        AlertCondition::HoursSinceLastIngestionAbove(bound) => {
            let last = recent.iter().map(|r| r.started_at).max()?;
            let hours = (now - last).num_hours();
            (hours > *bound).then(|| format!("last ingestion started {hours}h ago"))
        }
        AlertCondition::AnomalySeverityCritical => {
            let critical = metrics
                .iter()
                .find(|m| m.status == HealthStatus::Critical)?;
            Some(format!(
                "{} metric {} is critical (value {:.3})",
                critical.metric_type, critical.metric_name, critical.value
            ))
        }
        AlertCondition::AnomalyCountAbove(bound) => {
            let count = metrics
                .iter()
                .filter(|m| m.status != HealthStatus::Healthy)
                .count();
            (count > *bound).then(|| format!("{count} unhealthy metrics"))
        }
    }
}
