use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

/// Installs the JSON subscriber and routes `log` records (teloxide logs
/// through `log`) into it.
///
/// `log_level` takes `EnvFilter` directives, so both `debug` and
/// `qabot=debug,teloxide=warn` work. Unparsable input falls back to `info`.
pub fn init_tracing(log_level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(log_filter(log_level))
        .json()
        .with_span_events(FmtSpan::ENTER)
        .log_internal_errors(true)
        .with_line_number(true)
        .with_target(false)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Tracing is already initialized: {e}");
        return;
    }
    if let Err(e) = tracing_log::LogTracer::init() {
        tracing::warn!("Failed to forward log records: {}", e);
    }
}

fn log_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(log_level).unwrap_or_else(|e| {
        eprintln!("Ignoring LOG_LEVEL '{log_level}': {e}");
        EnvFilter::new("info")
    })
}
