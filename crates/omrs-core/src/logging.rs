//! `tracing-subscriber` setup, trimmed from the storage crate's `logging::init` to the concerns
//! this core actually owns: an `EnvFilter` and a choice of text/JSON formatting. The OTLP
//! exporter and rolling file appender are transport/deployment concerns this crate does not own.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::{Layer, SubscriberExt},
    util::{SubscriberInitExt, TryInitError},
    EnvFilter, Registry,
};

use crate::config::LogFormat;

/// Initializes the global `tracing` subscriber for a running cohort member.
///
/// # Errors
///
/// Returns [`TryInitError`] if a global subscriber has already been installed.
pub fn init_logger(log_format: LogFormat, log_filter: &str) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_new(log_filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let base = fmt::layer().with_span_events(FmtSpan::CLOSE);
    let layer: Box<dyn Layer<Registry> + Send + Sync> = match log_format {
        LogFormat::Full => Box::new(base),
        LogFormat::Pretty => Box::new(base.pretty()),
        LogFormat::Json => Box::new(base.json()),
        LogFormat::Compact => Box::new(base.compact()),
    };

    tracing_subscriber::registry().with(filter).with(layer).try_init()
}
