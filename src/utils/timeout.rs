//! Timeout validation utilities for locator and correlator options

use std::time::Duration;

use crate::utils::errors::LocatorError;

/// Maximum timeout for waits that span a whole action (5 minutes)
/// Covers overall locate budgets, response correlation and drag resolution
pub const MAX_WAIT_TIMEOUT_MS: u64 = 300_000; // 5 minutes

/// Maximum timeout for a single probe or interaction (30 seconds)
pub const MAX_INTERACTION_TIMEOUT_MS: u64 = 30_000; // 30 seconds

/// Validate timeout for whole-action waits (overall locate, correlation)
///
/// # Arguments
/// * `timeout_ms` - Optional timeout in milliseconds
/// * `default_ms` - Default timeout if None provided
///
/// # Returns
/// * `Ok(Duration)` - Validated Duration object
/// * `Err(LocatorError)` - If timeout is zero or exceeds MAX_WAIT_TIMEOUT_MS
pub fn validate_wait_timeout(
    timeout_ms: Option<u64>,
    default_ms: u64,
) -> Result<Duration, LocatorError> {
    let ms = timeout_ms.unwrap_or(default_ms);

    if ms == 0 {
        return Err(LocatorError::InvalidArguments(
            "Timeout must be greater than 0ms".to_string(),
        ));
    }

    if ms > MAX_WAIT_TIMEOUT_MS {
        return Err(LocatorError::InvalidArguments(format!(
            "Timeout cannot exceed {}ms ({} minutes). Received: {}ms ({:.1} minutes)",
            MAX_WAIT_TIMEOUT_MS,
            MAX_WAIT_TIMEOUT_MS / 60_000,
            ms,
            ms as f64 / 60_000.0
        )));
    }

    Ok(Duration::from_millis(ms))
}

/// Validate timeout for single probes and element interactions (click, fill)
///
/// # Arguments
/// * `timeout_ms` - Optional timeout in milliseconds
/// * `default_ms` - Default timeout if None provided
///
/// # Returns
/// * `Ok(Duration)` - Validated Duration object
/// * `Err(LocatorError)` - If timeout is zero or exceeds MAX_INTERACTION_TIMEOUT_MS
pub fn validate_interaction_timeout(
    timeout_ms: Option<u64>,
    default_ms: u64,
) -> Result<Duration, LocatorError> {
    let ms = timeout_ms.unwrap_or(default_ms);

    if ms == 0 {
        return Err(LocatorError::InvalidArguments(
            "Timeout must be greater than 0ms".to_string(),
        ));
    }

    if ms > MAX_INTERACTION_TIMEOUT_MS {
        return Err(LocatorError::InvalidArguments(format!(
            "Timeout cannot exceed {}ms ({} seconds). Received: {}ms ({} seconds)",
            MAX_INTERACTION_TIMEOUT_MS,
            MAX_INTERACTION_TIMEOUT_MS / 1000,
            ms,
            ms / 1000
        )));
    }

    Ok(Duration::from_millis(ms))
}

/// Reject zero and over-long durations built in code rather than from config.
pub(crate) fn check_duration(
    what: &str,
    value: Duration,
    max_ms: u64,
) -> Result<(), LocatorError> {
    if value.is_zero() {
        return Err(LocatorError::InvalidArguments(format!(
            "{what} must be greater than 0ms"
        )));
    }
    if value > Duration::from_millis(max_ms) {
        return Err(LocatorError::InvalidArguments(format!(
            "{what} cannot exceed {max_ms}ms. Received: {}ms",
            value.as_millis()
        )));
    }
    Ok(())
}
