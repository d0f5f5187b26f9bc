//! Append-only run-metadata store over SQLite.
//!
//! One row per batch: the frequently-queried fields are real indexed
//! columns, everything else (source files, validation summary, stage
//! metrics, pillar scores) lives in a JSON blob alongside them. All
//! writes run in a transaction keyed by batch id, so a failed write
//! leaves the prior snapshot intact.

use std::sync::Mutex;

use chrono::{Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use cmspipe_types::{BatchRecord, PillarSnapshot, RunStatus, SourceFileRef, StoreError};

const SCHEMA_DDL: &str = "
CREATE TABLE IF NOT EXISTS ingestion_runs (
    batch_id            TEXT PRIMARY KEY,
    release_id          TEXT NOT NULL,
    dataset_name        TEXT NOT NULL,
    vintage_date        TEXT,
    product_year        INTEGER,
    started_at          TEXT NOT NULL,
    completed_at        TEXT,
    duration_seconds    REAL,
    status              TEXT NOT NULL,
    quality_score       REAL NOT NULL DEFAULT 1.0,
    input_row_count     INTEGER NOT NULL DEFAULT 0,
    output_row_count    INTEGER NOT NULL DEFAULT 0,
    rejected_row_count  INTEGER NOT NULL DEFAULT 0,
    source_url          TEXT,
    error_type          TEXT,
    error_message       TEXT,
    record_json         TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_runs_dataset  ON ingestion_runs(dataset_name);
CREATE INDEX IF NOT EXISTS idx_runs_release  ON ingestion_runs(release_id);
CREATE INDEX IF NOT EXISTS idx_runs_started  ON ingestion_runs(started_at);
CREATE INDEX IF NOT EXISTS idx_runs_status   ON ingestion_runs(status);
";

/// Incremental update applied between stages.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunProgress {
    pub input_row_count: Option<u64>,
    pub output_row_count: Option<u64>,
    pub rejected_row_count: Option<u64>,
    pub quality_score: Option<f64>,
    pub schema_version: Option<String>,
    pub business_rules_applied: Option<Vec<String>>,
    pub validation_summary: Option<serde_json::Value>,
    pub warnings: Vec<String>,
    pub pillars: Option<PillarSnapshot>,
    pub source_files: Option<Vec<SourceFileRef>>,
}

/// Aggregate statistics over a trailing window of runs.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatistics {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub partial_runs: u64,
    pub success_rate: f64,
    pub avg_duration_seconds: f64,
    pub avg_quality_score: f64,
    pub rejection_rate: f64,
}

/// Handle to the run-metadata database. Cheap to share behind an
/// `Arc`; the inner connection is serialized by a mutex.
pub struct MetadataStore {
    conn: Mutex<Connection>,
}

impl MetadataStore {
    /// Open (creating if needed) the store at the given path.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch(SCHEMA_DDL).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA_DDL).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert a new batch record. The record must be in the
    /// `Running` state; completed records only arrive via
    /// [`MetadataStore::complete_run`].
    pub fn create_run(&self, record: &BatchRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO ingestion_runs (
                batch_id, release_id, dataset_name, vintage_date, product_year,
                started_at, status, quality_score,
                input_row_count, output_row_count, rejected_row_count,
                source_url, record_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                record.batch_id.as_str(),
                record.release_id.as_str(),
                record.dataset_name,
                record.vintage_date,
                record.product_year,
                record.started_at.to_rfc3339(),
                record.status.as_str(),
                record.quality_score,
                record.input_row_count,
                record.output_row_count,
                record.rejected_row_count,
                record.source_urls.first().map(String::as_str),
                json,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Apply a progress update inside one transaction.
    pub fn update_run_progress(
        &self,
        batch_id: &str,
        progress: &RunProgress,
    ) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(db_err)?;

        let mut record = read_record(&tx, batch_id)?;
        if let Some(v) = progress.input_row_count {
            record.input_row_count = v;
        }
        if let Some(v) = progress.output_row_count {
            record.output_row_count = v;
        }
        if let Some(v) = progress.rejected_row_count {
            record.rejected_row_count = v;
        }
        if let Some(v) = progress.quality_score {
            record.quality_score = v;
        }
        if let Some(v) = &progress.schema_version {
            record.schema_version = v.clone();
        }
        if let Some(v) = &progress.business_rules_applied {
            record.business_rules_applied = v.clone();
        }
        if let Some(v) = &progress.validation_summary {
            record.validation_summary = Some(v.clone());
        }
        if let Some(v) = progress.pillars {
            record.pillars = Some(v);
        }
        if let Some(v) = &progress.source_files {
            record.source_files = v.clone();
        }
        record.warnings.extend(progress.warnings.iter().cloned());
        record.updated_at = Utc::now();

        write_record(&tx, &record)?;
        tx.commit().map_err(db_err)
    }

    /// Mark a run terminal.
    pub fn complete_run(
        &self,
        batch_id: &str,
        status: RunStatus,
        output_record_count: u64,
        error_type: Option<&str>,
        error_message: Option<&str>,
        processing_cost_usd: f64,
    ) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(db_err)?;

        let mut record = read_record(&tx, batch_id)?;
        record.output_row_count = output_record_count;
        record.error_type = error_type.map(ToString::to_string);
        record.error_message = error_message.map(ToString::to_string);
        record.telemetry.processing_cost_usd = processing_cost_usd;
        record.complete(status);

        write_record(&tx, &record)?;
        tx.commit().map_err(db_err)
    }

    /// Fetch one batch record.
    pub fn get_run_metadata(&self, batch_id: &str) -> Result<BatchRecord, StoreError> {
        let conn = self.lock();
        read_record(&conn, batch_id)
    }

    /// Most recent runs, newest first.
    pub fn get_recent_runs(&self, limit: usize) -> Result<Vec<BatchRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT record_json FROM ingestion_runs
                 ORDER BY started_at DESC LIMIT ?1",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![limit as i64], |row| row.get::<_, String>(0))
            .map_err(db_err)?;
        let mut records = Vec::new();
        for row in rows {
            let json = row.map_err(db_err)?;
            records.push(
                serde_json::from_str(&json)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?,
            );
        }
        Ok(records)
    }

    /// Aggregate statistics over the trailing `days`.
    pub fn get_run_statistics(&self, days: i64) -> Result<RunStatistics, StoreError> {
        let cutoff = (Utc::now() - Duration::days(days)).to_rfc3339();
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT
                    COUNT(*),
                    SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN status = 'partial' THEN 1 ELSE 0 END),
                    AVG(duration_seconds),
                    AVG(quality_score),
                    SUM(rejected_row_count),
                    SUM(output_row_count + rejected_row_count)
                 FROM ingestion_runs WHERE started_at >= ?1",
                params![cutoff],
                |row| {
                    Ok((
                        row.get::<_, u64>(0)?,
                        row.get::<_, Option<u64>>(1)?,
                        row.get::<_, Option<u64>>(2)?,
                        row.get::<_, Option<u64>>(3)?,
                        row.get::<_, Option<f64>>(4)?,
                        row.get::<_, Option<f64>>(5)?,
                        row.get::<_, Option<u64>>(6)?,
                        row.get::<_, Option<u64>>(7)?,
                    ))
                },
            )
            .map_err(db_err)?;

        let (total, success, failed, partial, avg_dur, avg_quality, rejected, processed) = row;
        let total_rows_processed = processed.unwrap_or(0);
        Ok(RunStatistics {
            total_runs: total,
            successful_runs: success.unwrap_or(0),
            failed_runs: failed.unwrap_or(0),
            partial_runs: partial.unwrap_or(0),
            success_rate: if total == 0 {
                0.0
            } else {
                success.unwrap_or(0) as f64 / total as f64
            },
            avg_duration_seconds: avg_dur.unwrap_or(0.0),
            avg_quality_score: avg_quality.unwrap_or(0.0),
            rejection_rate: if total_rows_processed == 0 {
                0.0
            } else {
                rejected.unwrap_or(0) as f64 / total_rows_processed as f64
            },
        })
    }

    /// Run a closure against the underlying connection. The
    /// observability layer keeps its alert tables in the same
    /// database through this seam.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, StoreError> {
        let conn = self.lock();
        f(&conn).map_err(db_err)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned store mutex means a panic mid-write; recovering
        // the guard is safe because every write is transactional.
        self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn read_record(conn: &Connection, batch_id: &str) -> Result<BatchRecord, StoreError> {
    let json: Option<String> = conn
        .query_row(
            "SELECT record_json FROM ingestion_runs WHERE batch_id = ?1",
            params![batch_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)?;
    let json = json.ok_or_else(|| StoreError::RunNotFound {
        batch_id: batch_id.to_string(),
    })?;
    serde_json::from_str(&json).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn write_record(conn: &Connection, record: &BatchRecord) -> Result<(), StoreError> {
    let json =
        serde_json::to_string(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
    conn.execute(
        "UPDATE ingestion_runs SET
            status = ?2,
            completed_at = ?3,
            duration_seconds = ?4,
            quality_score = ?5,
            input_row_count = ?6,
            output_row_count = ?7,
            rejected_row_count = ?8,
            error_type = ?9,
            error_message = ?10,
            record_json = ?11
         WHERE batch_id = ?1",
        params![
            record.batch_id.as_str(),
            record.status.as_str(),
            record.completed_at.map(|t| t.to_rfc3339()),
            record.duration_seconds,
            record.quality_score,
            record.input_row_count,
            record.output_row_count,
            record.rejected_row_count,
            record.error_type,
            record.error_message,
            json,
        ],
    )
    .map_err(db_err)?;
    Ok(())
}
