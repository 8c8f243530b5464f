//! Tracing subscriber setup.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Installs a global `tracing` subscriber filtered by `RUST_LOG`.
///
/// With `json` set, events are written as flattened JSON lines. Returns
/// false if a global subscriber was already installed, in which case the
/// existing one is kept.
pub fn init_tracing(json: bool) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let result = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).flatten_event(true))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_target(true))
            .try_init()
    };

    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing(false);
        assert!(!init_tracing(true));
    }
}
