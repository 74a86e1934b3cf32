//! Shared timeout defaults
//!
//! Values used throughout the crate so callers and config defaults agree.

use std::time::Duration;

/// Short wait, e.g. a response body that is still downloading
pub const SHORT_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Medium wait, e.g. reading a matched response's body end to end
pub const MEDIUM_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Default probe budget for a single candidate
pub const DEFAULT_PER_CANDIDATE_MS: u64 = 3_000;

/// Default visibility budget per enumerated element in text search
pub const DEFAULT_PER_ELEMENT_MS: u64 = 1_000;

/// Default timeout for the click/fill after a successful locate
pub const DEFAULT_ACTION_MS: u64 = 30_000;

/// Default correlation wait
pub const DEFAULT_CORRELATION_MS: u64 = 30_000;

/// Default wait for drag endpoints to become visible
pub const DEFAULT_DRAG_RESOLVE_MS: u64 = 30_000;

/// Time given to the page to register a drop
pub const DEFAULT_DRAG_SETTLE_MS: u64 = 1_000;
