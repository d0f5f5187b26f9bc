use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Instrument};

use cmspipe_fips::{normalize_locality_fips, FipsReference, NormalizeOptions};
use cmspipe_kit::metadata::MetadataContext;
use cmspipe_kit::ParseResult;
use cmspipe_land::source::SourceProvider;
use cmspipe_land::{land, LandOutcome};
use cmspipe_parsers::LayoutRegistry;
use cmspipe_publish::{publish_dataset, DatasetManifestEntry, RunManifest};
use cmspipe_schema::SchemaRegistry;
use cmspipe_store::{MetadataStore, RunProgress};
use cmspipe_types::atomic_write::write_file_atomic;
use cmspipe_types::jcs::emit_jcs;
use cmspipe_types::logging::stage_span;
use cmspipe_types::{
    BatchId, BatchRecord, PipelineConfig, PipelineError, ReleaseId, RunStatus, SourceFileRef,
};
use cmspipe_validate::{aggregate, run_standard_suite, ValidationSummary};

use crate::dispatch::parse_dataset;

/// What `ingest` reports back to the caller.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub status: RunStatus,
    pub release_id: ReleaseId,
    pub batch_id: BatchId,
    pub record_count: u64,
    pub quality_score: f64,
    /// True when every BLOCK rule passed and the quality score meets
    /// the configured threshold.
    pub dis_compliance: bool,
}

/// The orchestrator. Holds the injected registries and the
/// run-metadata store; no ambient singletons.
pub struct Pipeline {
    config: PipelineConfig,
    registry: SchemaRegistry,
    layouts: LayoutRegistry,
    store: Arc<MetadataStore>,
    reference: Option<FipsReference>,
}

struct ParsedDataset {
    dataset: String,
    filename: String,
    result: ParseResult,
    summary: Option<ValidationSummary>,
}

impl Pipeline {
    #[must_use]
    pub fn new(config: PipelineConfig, store: Arc<MetadataStore>) -> Self {
        Self {
            config,
            registry: SchemaRegistry::builtin(),
            layouts: LayoutRegistry::builtin(),
            store,
            reference: None,
        }
    }

    /// Attach the census county reference, enabling the locality
    /// FIPS normalization stage.
    #[must_use]
    pub fn with_reference(mut self, reference: FipsReference) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Drive one batch end to end.
    ///
    /// Stage errors terminate the batch and come back as a `failed`
    /// (or `cancelled`) outcome with the error recorded on the run;
    /// an `Err` from this function means the pipeline itself could
    /// not record what happened.
    pub async fn ingest(
        &self,
        provider: Arc<dyn SourceProvider>,
        batch_id: Option<BatchId>,
        cancel: CancellationToken,
    ) -> Result<IngestOutcome, PipelineError> {
        let descriptor = provider.describe();
        let batch_id = batch_id.unwrap_or_else(BatchId::generate);
        let release_id = descriptor.release_id.clone();

        let datasets: Vec<String> = {
            let mut names: Vec<String> =
                descriptor.files.iter().map(|f| f.dataset.clone()).collect();
            names.sort();
            names.dedup();
            names
        };
        let mut record = BatchRecord::new(
            batch_id.clone(),
            release_id.clone(),
            datasets.join("+"),
            "cmspipe",
        );
        record.vintage_date = Some(descriptor.vintage_date.clone());
        record.product_year = Some(descriptor.product_year);
        record.source_urls = descriptor.files.iter().map(|f| f.url.clone()).collect();
        self.store.create_run(&record)?;

        let budget = self.config.time_budget();
        let run = self.run_stages(&provider, &record, cancel.clone());
        let outcome = tokio::select! {
            result = tokio::time::timeout(budget, run) => match result {
                Ok(inner) => inner,
                Err(_) => Err(PipelineError::TimeBudgetExceeded {
                    budget_hours: self.config.max_processing_time_hours,
                }),
            },
            () = cancel.cancelled() => Err(PipelineError::Cancelled {
                stage: "in-flight".to_string(),
            }),
        };

        match outcome {
            Ok((record_count, quality_score, dis_compliance)) => {
                self.store.complete_run(
                    batch_id.as_str(),
                    RunStatus::Success,
                    record_count,
                    None,
                    None,
                    0.0,
                )?;
                info!(batch_id = %batch_id, records = record_count, "batch succeeded");
                Ok(IngestOutcome {
                    status: RunStatus::Success,
                    release_id,
                    batch_id,
                    record_count,
                    quality_score,
                    dis_compliance,
                })
            }
            Err(e) => {
                let status = match &e {
                    PipelineError::Cancelled { .. } => RunStatus::Cancelled,
                    _ => RunStatus::Failed,
                };
                error!(batch_id = %batch_id, error = %e, "batch terminated");
                self.store.complete_run(
                    batch_id.as_str(),
                    status,
                    0,
                    Some(e.error_type()),
                    Some(&e.to_string()),
                    0.0,
                )?;
                Ok(IngestOutcome {
                    status,
                    release_id,
                    batch_id,
                    record_count: 0,
                    quality_score: 0.0,
                    dis_compliance: false,
                })
            }
        }
    }

    /// Land → Validate → Normalize → Enrich → Publish.
    async fn run_stages(
        &self,
        provider: &Arc<dyn SourceProvider>,
        record: &BatchRecord,
        cancel: CancellationToken,
    ) -> Result<(u64, f64, bool), PipelineError> {
        let descriptor = provider.describe();
        let batch_id = record.batch_id.as_str();
        let release_id = record.release_id.as_str();
        let started = Instant::now();

        // Land.
        let landed = land(
            Arc::clone(provider),
            &self.config.output_dir,
            self.config.fetch_parallelism,
        )
        .instrument(stage_span(release_id, batch_id, "land"))
        .await?;
        self.record_source_files(batch_id, &landed)?;
        self.check_cancelled(&cancel, "land")?;

        // Validate: parse every landed file and run the validator
        // suite against its frame.
        let mut parsed = Vec::new();
        {
            let _span = stage_span(release_id, batch_id, "validate").entered();
            for file in &landed.files {
                let ctx = MetadataContext {
                    release_id: release_id.to_string(),
                    vintage_date: descriptor.vintage_date.clone(),
                    product_year: descriptor.product_year,
                    quarter_vintage: descriptor.quarter_vintage.clone(),
                    source_filename: file.file.filename.clone(),
                    source_file_sha256: file.sha256.clone(),
                };
                let result =
                    parse_dataset(&file.dataset, &file.bytes, &ctx, &self.registry, &self.layouts)?;
                parsed.push(ParsedDataset {
                    dataset: file.dataset.clone(),
                    filename: file.file.filename.clone(),
                    result,
                    summary: None,
                });
            }
        }
        self.check_cancelled(&cancel, "validate")?;

        // Normalize: stage-2 locality expansion when the reference is
        // available.
        if let Some(reference) = &self.reference {
            let _span = stage_span(release_id, batch_id, "normalize").entered();
            let stage1: Vec<&ParsedDataset> = parsed
                .iter()
                .filter(|p| p.dataset == "locality_raw")
                .collect();
            let mut expanded = Vec::new();
            for p in stage1 {
                let ctx = MetadataContext {
                    release_id: release_id.to_string(),
                    vintage_date: descriptor.vintage_date.clone(),
                    product_year: descriptor.product_year,
                    quarter_vintage: descriptor.quarter_vintage.clone(),
                    source_filename: p.filename.clone(),
                    source_file_sha256: landed
                        .files
                        .iter()
                        .find(|f| f.file.filename == p.filename)
                        .map(|f| f.sha256.clone())
                        .unwrap_or_default(),
                };
                let options = NormalizeOptions {
                    use_fuzzy: self.config.use_fuzzy_county_match,
                    source_release_id: Some(release_id.to_string()),
                };
                let result = normalize_locality_fips(
                    &p.result.data,
                    reference,
                    &options,
                    &ctx,
                    &self.registry,
                )?;
                expanded.push(ParsedDataset {
                    dataset: "locality_fips".to_string(),
                    filename: p.filename.clone(),
                    result,
                    summary: None,
                });
            }
            parsed.extend(expanded);
        }
        self.check_cancelled(&cancel, "normalize")?;

        // Enrich: dataset-level validator suites plus the
        // cross-dataset referential checks.
        let mut warnings = Vec::new();
        let mut quality_scores = Vec::new();
        let mut all_block_passed = true;
        {
            let _span = stage_span(release_id, batch_id, "enrich").entered();
            let today = Utc::now().date_naive();
            for p in &mut parsed {
                let Some(contract) = self.registry.get(&p.dataset) else {
                    continue;
                };
                let reports = run_standard_suite(&p.result.data, contract, today);
                let summary = aggregate(&reports);
                if !summary.overall_passed {
                    all_block_passed = false;
                    for report in summary.reports.iter().filter(|r| r.is_block_failure()) {
                        warnings.push(format!(
                            "{}: rule {} failed ({} failures)",
                            p.dataset, report.rule_name, report.failed
                        ));
                    }
                }
                quality_scores.push(summary.overall_score);
                p.summary = Some(summary);
            }

            let zip9 = parsed.iter().find(|p| p.dataset == "zip9_override");
            let zip5 = parsed.iter().find(|p| p.dataset == "zip5_locality");
            if let (Some(zip9), Some(zip5)) = (zip9, zip5) {
                let report =
                    cmspipe_validate::cross::zip9_zip5_consistency(&zip9.result.data, &zip5.result.data);
                if report.warnings > 0 {
                    warnings.push(format!(
                        "zip9/zip5 consistency: {} conflicts",
                        report.warnings
                    ));
                }
                quality_scores.push(report.quality_score);
            }
        }
        self.check_cancelled(&cancel, "enrich")?;

        let quality_score = if quality_scores.is_empty() {
            1.0
        } else {
            quality_scores.iter().sum::<f64>() / quality_scores.len() as f64
        };
        let business_rules: Vec<String> = parsed
            .iter()
            .flat_map(|p| {
                p.summary
                    .iter()
                    .flat_map(|s| s.reports.iter().map(|r| r.rule_name.clone()))
            })
            .collect();
        self.store.update_run_progress(
            batch_id,
            &RunProgress {
                input_row_count: Some(
                    parsed.iter().map(|p| p.result.metrics.total_rows as u64).sum(),
                ),
                rejected_row_count: Some(
                    parsed.iter().map(|p| p.result.rejects.len() as u64).sum(),
                ),
                quality_score: Some(quality_score),
                business_rules_applied: Some(business_rules),
                validation_summary: Some(validation_blob(&parsed)),
                warnings: warnings.clone(),
                ..RunProgress::default()
            },
        )?;

        if !all_block_passed {
            return Err(PipelineError::ValidationFailed {
                detail: warnings.join("; "),
            });
        }

        // Publish.
        let mut total_rows = 0u64;
        {
            let _span = stage_span(release_id, batch_id, "publish").entered();
            self.write_schema_contracts(release_id, &parsed)?;
            let mut entries = Vec::new();
            for p in &parsed {
                let Some(contract) = self.registry.get(&p.dataset) else {
                    continue;
                };
                let published =
                    publish_dataset(&self.config.output_dir, release_id, &p.result, contract)?;
                total_rows += published.row_count as u64;
                entries.push(DatasetManifestEntry {
                    dataset: p.dataset.clone(),
                    files: vec![p.filename.clone()],
                    total_rows: p.result.metrics.total_rows as u64,
                    successful_rows: p.result.data.len() as u64,
                    failed_rows: p.result.rejects.len() as u64,
                    validation_errors: p
                        .summary
                        .as_ref()
                        .map_or(0, |s| s.reports.iter().map(|r| r.failed as u64).sum()),
                    validation_warnings: p
                        .summary
                        .as_ref()
                        .map_or(0, |s| s.reports.iter().map(|r| r.warnings as u64).sum()),
                    processing_time_seconds: p.result.metrics.parse_duration_sec,
                });
            }

            let completed_at = Utc::now();
            let mut manifest = RunManifest {
                run_id: batch_id.to_string(),
                release_id: release_id.to_string(),
                source_version: descriptor.quarter_vintage.clone(),
                run_type: "scheduled".to_string(),
                started_at: record
                    .started_at
                    .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                completed_at: completed_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                total_duration_seconds: started.elapsed().as_secs_f64(),
                datasets: entries,
                overall_status: RunStatus::Success.as_str().to_string(),
                totals: Default::default(),
            };
            manifest.refresh_totals();
            manifest.write(&self.config.output_dir)?;
        }

        let dis_compliance = all_block_passed && quality_score >= self.config.quality_threshold;
        Ok((total_rows, quality_score, dis_compliance))
    }

    fn record_source_files(
        &self,
        batch_id: &str,
        landed: &LandOutcome,
    ) -> Result<(), PipelineError> {
        let source_files: Vec<SourceFileRef> = landed
            .files
            .iter()
            .map(|f| SourceFileRef {
                url: f.file.url.clone(),
                filename: f.file.filename.clone(),
                sha256: f.sha256.clone(),
                size_bytes: f.size_bytes,
            })
            .collect();
        self.store.update_run_progress(
            batch_id,
            &RunProgress {
                source_files: Some(source_files),
                ..RunProgress::default()
            },
        )?;
        Ok(())
    }

    fn write_schema_contracts(
        &self,
        release_id: &str,
        parsed: &[ParsedDataset],
    ) -> Result<(), PipelineError> {
        let now = Utc::now();
        let mut contracts = serde_json::Map::new();
        for p in parsed {
            if let Some(contract) = self.registry.get(&p.dataset) {
                contracts.insert(p.dataset.clone(), contract.to_disk_value(now));
            }
        }
        let value = if contracts.len() == 1 {
            contracts.into_iter().next().map(|(_, v)| v).unwrap_or_default()
        } else {
            serde_json::Value::Object(contracts)
        };
        let json = emit_jcs(&value).map_err(|e| PipelineError::Internal(e.to_string()))?;
        let path = self
            .config
            .output_dir
            .join("stage")
            .join(release_id)
            .join("schema_contract.json");
        write_file_atomic(&path, &json)?;
        Ok(())
    }

    fn check_cancelled(
        &self,
        cancel: &CancellationToken,
        stage: &str,
    ) -> Result<(), PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled {
                stage: stage.to_string(),
            });
        }
        Ok(())
    }
}

fn validation_blob(parsed: &[ParsedDataset]) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for p in parsed {
        if let Some(summary) = &p.summary {
            map.insert(
                p.dataset.clone(),
                serde_json::to_value(summary).unwrap_or_default(),
            );
        }
    }
    serde_json::Value::Object(map)
}
