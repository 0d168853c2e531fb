//! Internal logging setup for srtree.
//!
//! This module initializes the logging configuration at startup. Logging
//! behaviour is controlled by the `DEBUG_SRTREE` environment variable. If
//! `DEBUG_SRTREE` is not set or is set to a falsy value ("0", "false", or
//! empty), logging stays disabled. Otherwise a debug-level subscriber is
//! installed.

#[cfg(feature = "setup_tracing")]
use ctor::ctor;
#[cfg(feature = "setup_tracing")]
use tracing::Level;

#[cfg(feature = "setup_tracing")]
#[ctor]
fn set_debug_level() {
    if std::env::var("DEBUG_SRTREE").map_or(true, |v| v == "0" || v == "false" || v.is_empty()) {
        // Logging stays disabled.
    } else {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .init();
    }
}
