//! Custom macros for reducing code repetition in loopwall

/// Log a failed best-effort call and continue execution
///
/// # Example
/// ```ignore
/// log_and_continue!(self.engine.set_rate(2.0), "set playback rate");
/// ```
#[macro_export]
macro_rules! log_and_continue {
    ($expr:expr, $context:expr) => {
        if let Err(e) = $expr {
            log::warn!("Failed to {}: {}", $context, e);
        }
    };
}
