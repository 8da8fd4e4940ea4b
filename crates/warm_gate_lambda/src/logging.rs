use tracing_subscriber::EnvFilter;

/// JSON log lines on stdout, filtered by `RUST_LOG` (default `info`).
///
/// Lambda stamps every line with its own timestamp and request id, so the
/// subscriber only emits fields, the current span and its parents.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // A second init (tests, embedded use) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_current_span(true)
        .with_span_list(true)
        .with_target(false)
        .without_time()
        .try_init();
}
