//! Environment variable utilities
//!
//! Typed getters with defaults, used by `PoolConfig::from_env` and the
//! `cmd/` binaries (`WQ_PORT`, `WQ_WORKERS`, ...). Parse failures are never
//! errors here: a variable that is unset or garbage falls back to the
//! default, so a typo in the environment degrades to the built-in behavior
//! instead of aborting startup.

use std::str::FromStr;

/// Parse `key` as a `T`. Unset or unparseable values yield `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or(default),
        Err(_) => default,
    }
}

/// Read `key` as a switch. "1", "true", "yes", "on" (any case) enable it;
/// any other set value disables it; unset yields `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    matches!(raw.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Parse `key` as a `T`, with no default: `None` when unset or unparseable.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok()?.parse().ok()
}

/// Read `key` as a plain string, falling back to `default` when unset.
#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Whether `key` is set at all, regardless of its value.
#[inline]
pub fn env_is_set(key: &str) -> bool {
    std::env::var_os(key).is_some()
}
