//! Telemetry helpers for structured logging and tracing.

/// Install a default env-filtered fmt subscriber unless the host application
/// already installed one. Filter with `RUST_LOG`, e.g. `RUST_LOG=studio_ledger=debug`.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(true)
        .try_init();
}
