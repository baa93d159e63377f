//! Environment variable helpers for runtime configuration overrides.
//!
//! Every `SCP_*` knob read by the framework goes through these so a bad
//! value silently falls back to the compiled-in default.

use std::str::FromStr;

/// Read `key` and parse it as `T`, returning `default` when unset or unparsable.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read `key` as a flag.
///
/// "1", "true", "yes" and "on" (any case) are true. Any other value is
/// false; an unset variable yields `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}
