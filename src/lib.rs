//! Resilient element location and network response correlation for
//! browser-driven end-to-end tests
//!
//! Both components run against a [`PageDriver`]; [`CdpDriver`] provides one
//! over a chromiumoxide page.

pub mod browser;
pub mod correlator;
pub mod driver;
pub mod locator;
mod utils;

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::utils::constants::{
    DEFAULT_ACTION_MS, DEFAULT_CORRELATION_MS, DEFAULT_DRAG_RESOLVE_MS, DEFAULT_DRAG_SETTLE_MS,
    DEFAULT_PER_CANDIDATE_MS, DEFAULT_PER_ELEMENT_MS,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub locator: LocatorConfig,

    #[serde(default)]
    pub correlator: CorrelatorConfig,

    #[serde(default)]
    pub drag: DragConfig,
}

/// Candidate search budgets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatorConfig {
    #[serde(default = "default_per_candidate_timeout_ms")]
    pub per_candidate_timeout_ms: u64,

    #[serde(default = "default_per_element_timeout_ms")]
    pub per_element_timeout_ms: u64,

    /// Cap on a whole locate call. Unset means the per-candidate budgets add up.
    #[serde(default)]
    pub overall_timeout_ms: Option<u64>,

    #[serde(default)]
    pub require_enabled: bool,

    /// Timeout for the click/fill after an element is found
    #[serde(default = "default_action_timeout_ms")]
    pub action_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatorConfig {
    #[serde(default = "default_correlation_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DragConfig {
    #[serde(default = "default_drag_resolve_timeout_ms")]
    pub resolve_timeout_ms: u64,

    #[serde(default = "default_drag_settle_ms")]
    pub settle_ms: u64,
}

fn default_per_candidate_timeout_ms() -> u64 {
    DEFAULT_PER_CANDIDATE_MS
}
fn default_per_element_timeout_ms() -> u64 {
    DEFAULT_PER_ELEMENT_MS
}
fn default_action_timeout_ms() -> u64 {
    DEFAULT_ACTION_MS
}
fn default_correlation_timeout_ms() -> u64 {
    DEFAULT_CORRELATION_MS
}
fn default_drag_resolve_timeout_ms() -> u64 {
    DEFAULT_DRAG_RESOLVE_MS
}
fn default_drag_settle_ms() -> u64 {
    DEFAULT_DRAG_SETTLE_MS
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            per_candidate_timeout_ms: default_per_candidate_timeout_ms(),
            per_element_timeout_ms: default_per_element_timeout_ms(),
            overall_timeout_ms: None,
            require_enabled: false,
            action_timeout_ms: default_action_timeout_ms(),
        }
    }
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_correlation_timeout_ms(),
        }
    }
}

impl Default for DragConfig {
    fn default() -> Self {
        Self {
            resolve_timeout_ms: default_drag_resolve_timeout_ms(),
            settle_ms: default_drag_settle_ms(),
        }
    }
}

impl CorrelatorConfig {
    pub fn timeout(&self) -> Result<Duration, LocatorError> {
        validate_wait_timeout(Some(self.timeout_ms), DEFAULT_CORRELATION_MS)
    }
}

/// Load config from a YAML file; a missing file yields defaults
pub fn load_yaml_config(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    } else {
        Ok(Config::default())
    }
}

pub use browser::{BrowserError, BrowserResult, BrowserSession};
pub use correlator::{
    CorrelationError, CorrelationOutcome, PendingResponse, ResponsePredicate, arm,
    await_matching, await_successful,
};
pub use driver::{CdpDriver, DriverError, DriverResult, ObservedResponse, PageDriver, Point, Rect};
pub use locator::{
    CandidateDescriptor, Discovery, DragError, DragOptions, LocateOptions, LocateOutcome,
    ResilientLocator, candidates, drag_and_drop, text_contains_any,
};
pub use utils::constants;
pub use utils::{LocatorError, validate_interaction_timeout, validate_wait_timeout};
