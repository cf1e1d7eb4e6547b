//! Environment variable helpers for configuration knobs.
//!
//! Unset or unparsable variables fall back to the caller's default; a bad
//! value never aborts registry construction.

use std::str::FromStr;

/// Parse `key` as `T`, or return `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    parse_or(std::env::var(key).ok().as_deref(), default)
}

/// `1`, `true`, `yes`, `on` (any case) are true; anything else set is false.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    parse_flag(std::env::var(key).ok().as_deref(), default)
}

/// `env_get` on an already looked-up value.
pub fn parse_or<T>(raw: Option<&str>, default: T) -> T
where
    T: FromStr,
{
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// `env_get_bool` on an already looked-up value.
pub fn parse_flag(raw: Option<&str>, default: bool) -> bool {
    match raw {
        Some(val) => matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}
