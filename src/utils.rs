use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "fundamentals_graph=info";

/// Install the fmt subscriber, honoring `RUST_LOG`.
///
/// `verbose` raises the crate's default level to debug. Calling this twice is harmless.
pub fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "fundamentals_graph=debug"
    } else {
        DEFAULT_LOG_FILTER
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
