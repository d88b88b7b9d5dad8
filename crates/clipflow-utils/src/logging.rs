//! Logging and observability infrastructure for clipflow
//!
//! Structured logging via tracing with env-filter overrides. The CLI calls
//! [`init_tracing`] once at startup; library code only emits events.

use tracing::{Level, info, span};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Initialize the tracing subscriber for structured logging.
///
/// Respects `RUST_LOG` when set; otherwise defaults to `clipflow=info` (or
/// `clipflow=debug` with `verbose`). Verbose mode includes targets and span
/// close events so stage durations show up in the output.
///
/// # Errors
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("clipflow=debug,info")
            } else {
                EnvFilter::try_new("clipflow=info,warn")
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

/// Create a span for one stage execution with structured fields.
pub fn stage_span(item_id: &str, stage: &str) -> tracing::Span {
    span!(
        Level::INFO,
        "stage_execution",
        item_id = %item_id,
        stage = %stage,
    )
}

/// Log a stage completion with its duration.
pub fn log_stage_complete(item_id: &str, stage: &str, duration_ms: u128) {
    info!(
        item_id = %item_id,
        stage = %stage,
        duration_ms = %duration_ms,
        "Stage complete"
    );
}
