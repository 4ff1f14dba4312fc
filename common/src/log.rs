//! Logging shortcuts.
//!
//! Everything goes through `tracing`; these macros only pin a target so the
//! terminal formatter can pick a distinct symbol for them.

/// Target used for positive-outcome messages.
pub const SUCCESS_TARGET: &str = "sitewatch::success";

/// Target used for raw terminal output that should be printed without a symbol.
pub const PRINT_TARGET: &str = "sitewatch::print";

/// Logs a positive outcome at INFO level.
#[macro_export]
macro_rules! success {
    ($($arg:tt)+) => {
        ::tracing::info!(target: "sitewatch::success", $($arg)+)
    };
}
