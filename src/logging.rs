//! tracing subscriber setup

use tracing_subscriber::EnvFilter;

/// Filter for `level`, unless `RUST_LOG` is set
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global fmt subscriber. Calling it twice is harmless.
pub fn init_logging(level: &str) {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(build_filter(level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!("Logging initialised at '{}'", level);
    }
}
