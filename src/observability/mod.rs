//! Structured logging setup.
//!
//! Closure operations emit `tracing` events at `debug`/`trace` level with
//! the forest, the node ids involved and the number of rows touched.
//! Nothing is printed unless the embedding application installs a
//! subscriber, for example with [`init_logging`].

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "treeclosure=info";

/// Initialize structured logging with `RUST_LOG` environment variable support.
///
/// Defaults to [`DEFAULT_FILTER`]. Call once at program startup;
/// subsequent calls are silently ignored by `tracing_subscriber`.
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // try_init so double-init in tests doesn't panic
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
