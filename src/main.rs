//! The cmspipe CLI: a thin wrapper that wires configuration into the
//! library components. All real behavior lives in the workspace
//! crates.

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use cmspipe::{
    DatasetExpectation, FipsReference, GeographyTables, HttpProvider, MetadataStore,
    NearestZipResolver, ObservabilityCollector, Pipeline, PipelineConfig, ReleaseDescriptor,
    ResolverOptions, SchemaRegistry, TablesDump,
};

#[derive(Parser)]
#[command(name = "cmspipe", version, about = "CMS reference-data ingestion pipeline")]
struct Cli {
    /// Path to the pipeline TOML configuration.
    #[arg(long, global = true)]
    config: Option<Utf8PathBuf>,

    /// Verbose structured logging.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one batch over a release described by a JSON descriptor.
    Ingest {
        /// Path to a JSON `ReleaseDescriptor`.
        #[arg(long)]
        release_file: Utf8PathBuf,
    },
    /// Show recent runs from the run-metadata store.
    Status {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Collect the five-pillar observability report for a dataset.
    Observe {
        dataset: String,
        /// Expected healthy row count for the volume pillar.
        #[arg(long, default_value_t = 50_000)]
        expected_volume: u64,
    },
    /// Resolve the nearest non-PO-box ZIP in the same state.
    Nearest {
        zip: String,
        /// Path to a JSON geography tables dump.
        #[arg(long)]
        tables: Utf8PathBuf,
        /// Skip the NBER fast path and always compute Haversine.
        #[arg(long)]
        no_nber: bool,
        #[arg(long, default_value_t = 100.0)]
        max_radius_miles: f64,
        #[arg(long)]
        trace: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cmspipe_types::logging::init_tracing(cli.verbose)
        .map_err(|e| anyhow::anyhow!("tracing init failed: {e}"))?;

    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Command::Ingest { release_file } => ingest(&config, &release_file).await,
        Command::Status { limit } => status(&config, limit),
        Command::Observe {
            dataset,
            expected_volume,
        } => observe(&config, &dataset, expected_volume),
        Command::Nearest {
            zip,
            tables,
            no_nber,
            max_radius_miles,
            trace,
        } => nearest(&zip, &tables, !no_nber, max_radius_miles, trace),
    }
}

async fn ingest(config: &PipelineConfig, release_file: &Utf8PathBuf) -> Result<()> {
    let raw = fs::read_to_string(release_file)
        .with_context(|| format!("Failed to read release descriptor: {release_file}"))?;
    let descriptor: ReleaseDescriptor = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid release descriptor: {release_file}"))?;

    let store = Arc::new(
        MetadataStore::open(config.database_path.as_str())
            .map_err(|e| anyhow::anyhow!("store open failed: {e}"))?,
    );
    let provider = Arc::new(HttpProvider::new(
        descriptor,
        config.http_timeout_secs,
        config.fetch_attempts,
        config.fetch_backoff_initial_secs,
    )?);

    let mut pipeline = Pipeline::new(config.clone(), store);
    if let Some(reference_dir) = &config.reference_dir {
        pipeline = pipeline.with_reference(FipsReference::from_csv_dir(reference_dir)?);
    }

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_cancel.cancel();
        }
    });

    let outcome = pipeline.ingest(provider, None, cancel).await?;
    println!(
        "{}",
        serde_json::json!({
            "status": outcome.status.as_str(),
            "release_id": outcome.release_id.as_str(),
            "batch_id": outcome.batch_id.as_str(),
            "record_count": outcome.record_count,
            "quality_score": outcome.quality_score,
            "dis_compliance": outcome.dis_compliance,
        })
    );
    Ok(())
}

fn status(config: &PipelineConfig, limit: usize) -> Result<()> {
    let store = MetadataStore::open(config.database_path.as_str())
        .map_err(|e| anyhow::anyhow!("store open failed: {e}"))?;
    for run in store
        .get_recent_runs(limit)
        .map_err(|e| anyhow::anyhow!("{e}"))?
    {
        println!(
            "{}  {:<9}  {:<24}  rows={} rejects={} quality={:.3}",
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            run.status.as_str(),
            run.dataset_name,
            run.output_row_count,
            run.rejected_row_count,
            run.quality_score,
        );
    }
    Ok(())
}

fn observe(config: &PipelineConfig, dataset: &str, expected_volume: u64) -> Result<()> {
    let store = Arc::new(
        MetadataStore::open(config.database_path.as_str())
            .map_err(|e| anyhow::anyhow!("store open failed: {e}"))?,
    );
    let registry = SchemaRegistry::builtin();
    let contract_columns: Vec<String> = registry
        .get(dataset)
        .map(|c| c.column_order.clone())
        .unwrap_or_default();

    let mut expectation = DatasetExpectation::quarterly(dataset, expected_volume);
    expectation.freshness_grace_hours = config.freshness_grace_hours;
    expectation.volume_tolerance = config.volume_tolerance;

    let collector = ObservabilityCollector::new(store);
    let report = collector
        .collect(
            &expectation,
            &contract_columns,
            &contract_columns,
            chrono::Utc::now(),
        )
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    println!(
        "{}",
        cmspipe_types::jcs::emit_jcs(&report).context("report serialization failed")?
    );
    Ok(())
}

fn nearest(
    zip: &str,
    tables_path: &Utf8PathBuf,
    use_nber: bool,
    max_radius_miles: f64,
    trace: bool,
) -> Result<()> {
    let raw = fs::read_to_string(tables_path)
        .with_context(|| format!("Failed to read tables dump: {tables_path}"))?;
    let dump: TablesDump = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid tables dump: {tables_path}"))?;
    let resolver = NearestZipResolver::new(Arc::new(GeographyTables::from(dump)));

    let options = ResolverOptions {
        use_nber,
        max_radius_miles,
        include_trace: trace,
    };
    match resolver.find_nearest_zip(zip, &options) {
        Ok(result) => {
            let mut output = serde_json::json!({
                "nearest_zip": result.nearest_zip,
                "distance_miles": result.distance_miles,
                "input_zip": result.input_zip,
            });
            if let Some(trace) = result.trace {
                output["trace"] = serde_json::to_value(&trace)?;
            }
            println!("{output}");
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", serde_json::json!({ "error": e.code(), "detail": e.to_string() }));
            std::process::exit(2);
        }
    }
}
