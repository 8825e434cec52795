//! Verbose diagnostics toggled by the environment
//!
//! `PORTFORWARD_DEBUG=YES` prints internal diagnostics to stdout regardless
//! of the session log level.

/// Environment variable enabling diagnostics
pub const DEBUG_ENV: &str = "PORTFORWARD_DEBUG";

/// Whether diagnostics are enabled
pub fn enabled() -> bool {
    std::env::var(DEBUG_ENV).map(|v| v == "YES").unwrap_or(false)
}

/// Print a diagnostic line when enabled
pub fn debug_print(msg: impl AsRef<str>) {
    if enabled() {
        println!("{}", msg.as_ref());
    }
}
