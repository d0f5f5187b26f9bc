//! Structured logging setup.
//!
//! Stages log through `tracing` spans carrying `release_id`,
//! `batch_id`, and `stage` fields; this module owns subscriber
//! initialization so the CLI and tests configure it exactly once.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Initialize the tracing subscriber.
///
/// Honors `RUST_LOG` when set; otherwise `cmspipe=info` (or
/// `cmspipe=debug` in verbose mode). Verbose mode also emits span
/// close events with timings.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("cmspipe=debug,info")
            } else {
                EnvFilter::try_new("cmspipe=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if verbose {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).compact())
            .try_init()?;
    }

    Ok(())
}

/// Span for one stage of one batch.
pub fn stage_span(release_id: &str, batch_id: &str, stage: &str) -> tracing::Span {
    tracing::span!(
        tracing::Level::INFO,
        "stage",
        release_id = %release_id,
        batch_id = %batch_id,
        stage = %stage,
    )
}
