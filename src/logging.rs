use tracing_subscriber::EnvFilter;

const FALLBACK_FILTER: &str = "info";

/// Install a stderr `fmt` subscriber.
///
/// `RUST_LOG` takes precedence over `filter` (usually `log.filter` from the
/// configuration). Returns `false` if a global subscriber was already
/// installed, in which case nothing changes.
pub fn init(filter: &str) -> bool {
    let (filter, invalid) = match EnvFilter::try_from_default_env() {
        Ok(from_env) => (from_env, None),
        Err(_) => match EnvFilter::try_new(filter) {
            Ok(configured) => (configured, None),
            Err(e) => (EnvFilter::new(FALLBACK_FILTER), Some(e)),
        },
    };
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok();
    if let Some(e) = invalid {
        tracing::warn!(error = %e, "invalid log filter; falling back to {FALLBACK_FILTER}");
    }
    installed
}
