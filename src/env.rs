//! Environment variable names used by this crate for configuration of the
//! logging profile and sinks.
//!
//! These are purely helpers; the sink types themselves never read the
//! environment.

/// `true` selects the development profile, `false` production.
pub const DEBUG_ENV: &str = "DEBUG";

/// Directory holding `today.log` and its archives.
pub const LOG_DIR_ENV: &str = "LOG_DIR";

/// Minimum severity for all sinks, e.g. `INFO`.
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// `pretty` or `json`.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Overrides whether the file sink is active.
pub const LOG_TO_FILE_ENV: &str = "LOG_TO_FILE";

/// Overrides ANSI colouring of the console sink.
pub const LOG_COLOR_ENV: &str = "LOG_COLOR";

/// Default value of [`LOG_DIR_ENV`].
pub const DEFAULT_LOG_DIR: &str = "data/logs";

/// Read an optional environment variable; empty values count as unset.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a boolean the way `.env` files usually spell them.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
