//! Tracing setup.
//!
//! The engine only emits `tracing` events; installing a subscriber is left
//! to the embedding process. [`init_tracing`] is the default setup:
//! compact formatting, filtered through `RUST_LOG` when it is set.

use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "regionkv=info";

/// Installs a global fmt subscriber.
///
/// `default_filter` applies only if `RUST_LOG` is absent or invalid.
/// Returns false if a global subscriber was already installed, which makes
/// repeated calls (for example from several tests) harmless.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .is_ok()
}
