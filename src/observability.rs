// Structured logging for the crate, following the layered
// registry().with(EnvFilter).with(fmt_layer) construction used throughout
// the corpus this crate grew out of.

use std::time::Instant;

use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::error::Result;

/// Initialize logging at the default verbosity. Safe to call more than
/// once; a second call is a no-op (tests commonly call this per-case).
pub fn init_logging() -> anyhow::Result<()> {
    init_logging_with_level(false, false)
}

/// Initialize logging with explicit verbosity flags. `quiet` takes
/// precedence over both `verbose` and `RUST_LOG`.
pub fn init_logging_with_level(verbose: bool, quiet: bool) -> anyhow::Result<()> {
    let default_filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("vectordb=debug,info")
    } else {
        EnvFilter::new("vectordb=warn,error")
    };

    let env_filter = if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or(default_filter)
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(!quiet)
        .with_thread_ids(!quiet)
        .with_line_number(!quiet)
        .with_file(!quiet);

    match tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
    {
        Ok(()) => {
            if !quiet {
                info!("vectordb observability initialized");
            }
            Ok(())
        }
        // Already initialized; fine in test binaries that call this per-case.
        Err(_) => Ok(()),
    }
}

/// Correlates a chain of operations for `#[tracing::instrument]`-annotated
/// entry points on `Collection` and `Db`. Not itself a tracing span; a
/// lightweight carrier that entry points log alongside their span.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub trace_id: Uuid,
    pub span_id: Uuid,
    pub parent_span_id: Option<Uuid>,
    pub operation: String,
}

impl OperationContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            span_id: Uuid::new_v4(),
            parent_span_id: None,
            operation: operation.into(),
        }
    }

    pub fn child(&self, operation: impl Into<String>) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: Uuid::new_v4(),
            parent_span_id: Some(self.span_id),
            operation: operation.into(),
        }
    }
}

/// Runs `f` under a fresh [`OperationContext`], logging start, success (with
/// elapsed time), and failure with the trace/span ids attached. Used by the
/// `#[instrument]`-annotated entry points on `Collection` and `Db` that do
/// real async work, rather than a plain `tracing` span alone.
pub async fn with_operation_context<F, T>(operation: &str, f: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    let ctx = OperationContext::new(operation);
    debug!(trace_id = %ctx.trace_id, span_id = %ctx.span_id, "starting {}", ctx.operation);

    let start = Instant::now();
    let result = f.await;
    let elapsed = start.elapsed();

    match &result {
        Ok(_) => {
            debug!(
                trace_id = %ctx.trace_id,
                span_id = %ctx.span_id,
                elapsed_ms = elapsed.as_millis(),
                "completed {}", ctx.operation
            );
        }
        Err(e) => {
            warn!(
                trace_id = %ctx.trace_id,
                span_id = %ctx.span_id,
                elapsed_ms = elapsed.as_millis(),
                error = %e,
                "failed {}", ctx.operation
            );
        }
    }
    result
}
