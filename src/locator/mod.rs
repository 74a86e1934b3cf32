//! Resilient element location
//!
//! Tries an ordered list of candidate selectors and returns the first one that
//! resolves to a visible (optionally enabled) element. A candidate whose probe
//! fails is treated as absent and the search moves on; only a lost browser
//! session stops it early.

mod actions;
mod drag;

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::LocatorConfig;
use crate::driver::{DriverError, DriverResult, PageDriver};
use crate::utils::constants::{
    DEFAULT_ACTION_MS, DEFAULT_PER_CANDIDATE_MS, DEFAULT_PER_ELEMENT_MS,
};
use crate::utils::{
    LocatorError, MAX_INTERACTION_TIMEOUT_MS, MAX_WAIT_TIMEOUT_MS, check_duration,
    validate_interaction_timeout, validate_wait_timeout,
};

pub use actions::Discovery;
pub use drag::{DragError, DragOptions, drag_and_drop};

/// One way of locating an element.
///
/// The selector is passed to the driver untouched; the label only shows up in
/// logs and error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateDescriptor {
    selector: String,
    label: Option<String>,
}

impl CandidateDescriptor {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            label: None,
        }
    }

    pub fn labeled(selector: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            label: Some(label.into()),
        }
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl fmt::Display for CandidateDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{} ({})", label, self.selector),
            None => f.write_str(&self.selector),
        }
    }
}

impl From<&str> for CandidateDescriptor {
    fn from(selector: &str) -> Self {
        Self::new(selector)
    }
}

impl From<String> for CandidateDescriptor {
    fn from(selector: String) -> Self {
        Self::new(selector)
    }
}

/// Build an ordered candidate list from plain selectors.
pub fn candidates<I, S>(selectors: I) -> Vec<CandidateDescriptor>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    selectors.into_iter().map(CandidateDescriptor::new).collect()
}

/// Case-insensitive "text contains any of" predicate for [`ResilientLocator::locate_by_predicate`].
pub fn text_contains_any<I, S>(needles: I) -> impl Fn(&str) -> bool + Send + Sync + 'static
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let needles: Vec<String> = needles
        .into_iter()
        .map(|n| n.as_ref().to_lowercase())
        .collect();
    move |text: &str| {
        let text = text.to_lowercase();
        needles.iter().any(|needle| text.contains(needle.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocateOptions {
    /// Budget for one candidate's probe.
    pub per_candidate_timeout: Duration,
    /// Budget for one enumerated element's visibility check in text search.
    pub per_element_timeout: Duration,
    pub require_enabled: bool,
    /// Cap on the whole search. `None` means the per-candidate budgets add up
    /// with no further cap.
    pub overall_timeout: Option<Duration>,
    /// Timeout for the click/fill that follows a successful locate.
    pub action_timeout: Duration,
}

impl Default for LocateOptions {
    fn default() -> Self {
        Self {
            per_candidate_timeout: Duration::from_millis(DEFAULT_PER_CANDIDATE_MS),
            per_element_timeout: Duration::from_millis(DEFAULT_PER_ELEMENT_MS),
            require_enabled: false,
            overall_timeout: None,
            action_timeout: Duration::from_millis(DEFAULT_ACTION_MS),
        }
    }
}

impl LocateOptions {
    pub fn per_candidate_timeout(mut self, timeout: Duration) -> Self {
        self.per_candidate_timeout = timeout;
        self
    }

    pub fn per_element_timeout(mut self, timeout: Duration) -> Self {
        self.per_element_timeout = timeout;
        self
    }

    pub fn require_enabled(mut self, require_enabled: bool) -> Self {
        self.require_enabled = require_enabled;
        self
    }

    pub fn overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = Some(timeout);
        self
    }

    pub fn action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), LocatorError> {
        check_duration(
            "Per-candidate timeout",
            self.per_candidate_timeout,
            MAX_INTERACTION_TIMEOUT_MS,
        )?;
        check_duration(
            "Per-element timeout",
            self.per_element_timeout,
            MAX_INTERACTION_TIMEOUT_MS,
        )?;
        check_duration("Action timeout", self.action_timeout, MAX_WAIT_TIMEOUT_MS)?;
        if let Some(overall) = self.overall_timeout {
            check_duration("Overall timeout", overall, MAX_WAIT_TIMEOUT_MS)?;
        }
        Ok(())
    }
}

impl TryFrom<&LocatorConfig> for LocateOptions {
    type Error = LocatorError;

    fn try_from(config: &LocatorConfig) -> Result<Self, Self::Error> {
        let overall_timeout = match config.overall_timeout_ms {
            Some(ms) => Some(validate_wait_timeout(Some(ms), ms)?),
            None => None,
        };
        Ok(Self {
            per_candidate_timeout: validate_interaction_timeout(
                Some(config.per_candidate_timeout_ms),
                DEFAULT_PER_CANDIDATE_MS,
            )?,
            per_element_timeout: validate_interaction_timeout(
                Some(config.per_element_timeout_ms),
                DEFAULT_PER_ELEMENT_MS,
            )?,
            require_enabled: config.require_enabled,
            overall_timeout,
            action_timeout: validate_wait_timeout(
                Some(config.action_timeout_ms),
                DEFAULT_ACTION_MS,
            )?,
        })
    }
}

/// Result of a locate call. Absence is a value, not an error.
#[derive(Debug)]
pub enum LocateOutcome<H> {
    Found { handle: H, index: usize },
    NotFound { attempted: usize },
}

impl<H> LocateOutcome<H> {
    pub fn is_found(&self) -> bool {
        matches!(self, LocateOutcome::Found { .. })
    }

    /// Index of the candidate that matched.
    pub fn index(&self) -> Option<usize> {
        match self {
            LocateOutcome::Found { index, .. } => Some(*index),
            LocateOutcome::NotFound { .. } => None,
        }
    }

    pub fn into_handle(self) -> Option<H> {
        match self {
            LocateOutcome::Found { handle, .. } => Some(handle),
            LocateOutcome::NotFound { .. } => None,
        }
    }

    /// Turn absence into an assertion failure, for callers that need the element.
    pub fn found_or(self, what: &str) -> Result<H, LocatorError> {
        match self {
            LocateOutcome::Found { handle, .. } => Ok(handle),
            LocateOutcome::NotFound { attempted } => Err(LocatorError::AssertionFailed(format!(
                "{what} not found after trying {attempted} candidate(s)"
            ))),
        }
    }
}

/// Wall-clock cap shared by all probes of one call.
struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    fn after(budget: Option<Duration>) -> Self {
        Self {
            at: budget.map(|b| Instant::now() + b),
        }
    }

    /// Budget for the next probe, or `None` once the deadline has passed.
    fn clamp(&self, per_probe: Duration) -> Option<Duration> {
        match self.at {
            None => Some(per_probe),
            Some(at) => {
                let remaining = at.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    None
                } else {
                    Some(per_probe.min(remaining))
                }
            }
        }
    }
}

/// Run one bounded driver query. An elapsed budget reads as `Ok(None)`.
async fn bounded<T, F>(budget: Duration, query: F) -> DriverResult<Option<T>>
where
    F: Future<Output = DriverResult<T>>,
{
    match tokio::time::timeout(budget, query).await {
        Ok(result) => result.map(Some),
        Err(_) => Ok(None),
    }
}

/// Sort a probe error into "give up" or "log and move on".
fn triage(error: DriverError, index: usize, candidate: &CandidateDescriptor) -> Result<(), LocatorError> {
    if error.is_fatal() {
        return Err(LocatorError::Driver(error));
    }
    debug!(
        index,
        selector = candidate.selector(),
        label = candidate.label().unwrap_or(""),
        error = %error,
        "Probe failed, treating candidate as absent"
    );
    Ok(())
}

/// First-match-wins search over candidate selectors.
#[derive(Debug, Clone, Default)]
pub struct ResilientLocator {
    options: LocateOptions,
}

impl ResilientLocator {
    pub fn new(options: LocateOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &LocateOptions {
        &self.options
    }

    /// Return the first candidate that resolves to a visible element.
    ///
    /// Candidates are probed strictly in order, each bounded by
    /// `per_candidate_timeout` and whatever is left of `overall_timeout`.
    /// `attempted` in `NotFound` counts the candidates actually probed.
    ///
    /// # Errors
    /// `EmptyCandidates` for an empty list, `InvalidArguments` for zero or
    /// over-long timeouts, `Driver` when the session is gone.
    pub async fn locate<D: PageDriver>(
        &self,
        driver: &D,
        candidates: &[CandidateDescriptor],
    ) -> Result<LocateOutcome<D::Handle>, LocatorError> {
        if candidates.is_empty() {
            return Err(LocatorError::EmptyCandidates);
        }
        self.options.validate()?;

        let deadline = Deadline::after(self.options.overall_timeout);
        let mut attempted = 0;

        for (index, candidate) in candidates.iter().enumerate() {
            let Some(budget) = deadline.clamp(self.options.per_candidate_timeout) else {
                debug!(attempted, "Overall locate deadline reached");
                break;
            };
            attempted += 1;

            match self.probe(driver, candidate, budget).await {
                Ok(Some(handle)) => {
                    info!(index, candidate = %candidate, "Candidate matched");
                    return Ok(LocateOutcome::Found { handle, index });
                }
                Ok(None) => debug!(index, candidate = %candidate, "Candidate not visible"),
                Err(e) => triage(e, index, candidate)?,
            }
        }

        debug!(attempted, total = candidates.len(), "No candidate matched");
        Ok(LocateOutcome::NotFound { attempted })
    }

    async fn probe<D: PageDriver>(
        &self,
        driver: &D,
        candidate: &CandidateDescriptor,
        budget: Duration,
    ) -> DriverResult<Option<D::Handle>> {
        let started = Instant::now();
        let Some(handle) = bounded(budget, driver.resolve_visible(candidate.selector(), budget))
            .await?
            .flatten()
        else {
            return Ok(None);
        };

        if !self.options.require_enabled {
            return Ok(Some(handle));
        }

        let left = budget.saturating_sub(started.elapsed());
        if left.is_zero() {
            return Ok(None);
        }
        match bounded(left, driver.is_enabled(&handle, left)).await? {
            Some(true) => Ok(Some(handle)),
            _ => {
                debug!(candidate = %candidate, "Candidate visible but not enabled");
                Ok(None)
            }
        }
    }

    /// Search the elements under each container selector for one whose text
    /// satisfies `predicate` and which is visible.
    ///
    /// `index` in `Found` is the container's position. Elements whose text
    /// cannot be read are skipped.
    pub async fn locate_by_predicate<D, P>(
        &self,
        driver: &D,
        containers: &[CandidateDescriptor],
        predicate: P,
    ) -> Result<LocateOutcome<D::Handle>, LocatorError>
    where
        D: PageDriver,
        P: Fn(&str) -> bool + Send + Sync,
    {
        if containers.is_empty() {
            return Err(LocatorError::EmptyCandidates);
        }
        self.options.validate()?;

        let deadline = Deadline::after(self.options.overall_timeout);
        let per_element = self.options.per_element_timeout;
        let mut attempted = 0;

        for (index, container) in containers.iter().enumerate() {
            let Some(budget) = deadline.clamp(self.options.per_candidate_timeout) else {
                debug!(attempted, "Overall locate deadline reached");
                break;
            };
            attempted += 1;

            let elements = match bounded(budget, driver.query_all(container.selector())).await {
                Ok(Some(elements)) => elements,
                Ok(None) => {
                    debug!(index, container = %container, "Enumerating elements timed out");
                    continue;
                }
                Err(e) => {
                    triage(e, index, container)?;
                    continue;
                }
            };
            debug!(index, container = %container, count = elements.len(), "Scanning elements");

            for element in elements {
                let Some(budget) = deadline.clamp(per_element) else {
                    return Ok(LocateOutcome::NotFound { attempted });
                };
                let text = match bounded(budget, driver.read_text(&element)).await {
                    Ok(Some(text)) => text,
                    Ok(None) => continue,
                    Err(e) if e.is_fatal() => return Err(LocatorError::Driver(e)),
                    Err(e) => {
                        debug!(error = %e, "Skipping element with unreadable text");
                        continue;
                    }
                };
                if !predicate(&text) {
                    continue;
                }

                let Some(budget) = deadline.clamp(per_element) else {
                    return Ok(LocateOutcome::NotFound { attempted });
                };
                match bounded(budget, driver.is_visible(&element, budget)).await {
                    Ok(Some(true)) => {
                        info!(index, container = %container, text = text.trim(), "Element matched by text");
                        return Ok(LocateOutcome::Found {
                            handle: element,
                            index,
                        });
                    }
                    Ok(_) => continue,
                    Err(e) if e.is_fatal() => return Err(LocatorError::Driver(e)),
                    Err(e) => debug!(error = %e, "Visibility check failed, skipping element"),
                }
            }
        }

        Ok(LocateOutcome::NotFound { attempted })
    }
}
