use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub const DEFAULT_FILTER: &str = "yt_captions=info";

/// Installs the global subscriber. Output always goes to standard error;
/// standard output is reserved for the JSON result. `RUST_LOG` overrides
/// `default_filter`. Calling it twice is harmless.
pub fn init_logging(default_filter: &str) {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}
