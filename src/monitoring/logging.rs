//! Structured JSON logging, grounded in the teacher's
//! `monitoring::logging::init_structured_logging`: a `tracing-subscriber`
//! JSON formatter driven by `RUST_LOG`/`LOG_LEVEL`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global JSON-formatted `tracing` subscriber. Call once at
/// process start, before any sink or coordinator is constructed.
pub fn init_structured_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    let fmt_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_target(true);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
