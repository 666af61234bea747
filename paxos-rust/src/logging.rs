use tracing_subscriber::{EnvFilter, fmt};

/// Installs the global fmt subscriber. `RUST_LOG` takes precedence over `level`.
///
/// Calling it again is a no-op, so tests may call it freely.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
