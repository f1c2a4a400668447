use tracing_subscriber::EnvFilter;

/// Installs a global `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter` (e.g. `"normref=info"`) when the variable is unset or invalid.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
