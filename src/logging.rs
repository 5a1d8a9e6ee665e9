//! Tracing subscriber setup for the binaries.
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Installs a formatted subscriber. `RUST_LOG` wins when set; otherwise
/// everything up to `level` is printed.
pub fn init(level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::from_level(level).into()));
    // keep an already-installed global subscriber
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
