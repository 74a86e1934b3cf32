//! Locate-then-act helpers built on [`ResilientLocator`]

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use super::{CandidateDescriptor, LocateOutcome, ResilientLocator};
use crate::driver::{DriverError, DriverResult, PageDriver};
use crate::utils::LocatorError;

/// Which strategy of [`ResilientLocator::discover`] produced the element.
#[derive(Debug)]
pub enum Discovery<H> {
    BySelector { handle: H, index: usize },
    ByText { handle: H, container: usize },
    NotFound { attempted: usize },
}

impl<H> Discovery<H> {
    pub fn is_found(&self) -> bool {
        !matches!(self, Discovery::NotFound { .. })
    }

    pub fn into_handle(self) -> Option<H> {
        match self {
            Discovery::BySelector { handle, .. } | Discovery::ByText { handle, .. } => Some(handle),
            Discovery::NotFound { .. } => None,
        }
    }
}

fn action_error(selector: &str, error: DriverError) -> LocatorError {
    if error.is_fatal() {
        LocatorError::Driver(error)
    } else {
        LocatorError::ActionFailed {
            selector: selector.to_string(),
            source: error,
        }
    }
}

async fn act<F>(selector: &str, timeout: Duration, action: F) -> Result<(), LocatorError>
where
    F: Future<Output = DriverResult<()>>,
{
    match tokio::time::timeout(timeout, action).await {
        Ok(result) => result.map_err(|e| action_error(selector, e)),
        Err(_) => Err(action_error(selector, DriverError::Timeout(timeout))),
    }
}

impl ResilientLocator {
    /// Button discovery: known selectors first, then a text search under the
    /// containers.
    ///
    /// An empty `containers` list skips the text search.
    pub async fn discover<D, P>(
        &self,
        driver: &D,
        candidates: &[CandidateDescriptor],
        containers: &[CandidateDescriptor],
        predicate: P,
    ) -> Result<Discovery<D::Handle>, LocatorError>
    where
        D: PageDriver,
        P: Fn(&str) -> bool + Send + Sync,
    {
        let by_selector = match self.locate(driver, candidates).await? {
            LocateOutcome::Found { handle, index } => {
                return Ok(Discovery::BySelector { handle, index });
            }
            LocateOutcome::NotFound { attempted } => attempted,
        };

        if containers.is_empty() {
            return Ok(Discovery::NotFound {
                attempted: by_selector,
            });
        }

        debug!(
            attempted = by_selector,
            "No selector matched, falling back to text search"
        );
        match self.locate_by_predicate(driver, containers, predicate).await? {
            LocateOutcome::Found { handle, index } => Ok(Discovery::ByText {
                handle,
                container: index,
            }),
            LocateOutcome::NotFound { attempted } => Ok(Discovery::NotFound {
                attempted: by_selector + attempted,
            }),
        }
    }

    /// Click the first visible candidate.
    ///
    /// Returns the index clicked, or `None` when nothing was found.
    pub async fn click_first<D: PageDriver>(
        &self,
        driver: &D,
        candidates: &[CandidateDescriptor],
    ) -> Result<Option<usize>, LocatorError> {
        let LocateOutcome::Found { handle, index } = self.locate(driver, candidates).await? else {
            return Ok(None);
        };
        let selector = candidates[index].selector();
        let timeout = self.options.action_timeout;
        act(selector, timeout, driver.click(&handle, timeout)).await?;
        info!(index, selector, "Clicked element");
        Ok(Some(index))
    }

    /// Fill the first visible candidate with `text`.
    pub async fn fill_first<D: PageDriver>(
        &self,
        driver: &D,
        candidates: &[CandidateDescriptor],
        text: &str,
    ) -> Result<Option<usize>, LocatorError> {
        let LocateOutcome::Found { handle, index } = self.locate(driver, candidates).await? else {
            return Ok(None);
        };
        let selector = candidates[index].selector();
        act(
            selector,
            self.options.action_timeout,
            driver.fill(&handle, text),
        )
        .await?;
        info!(index, selector, chars = text.chars().count(), "Filled element");
        Ok(Some(index))
    }

    /// Hand a local file to the first visible file input.
    ///
    /// Fails with `FileNotFound` before touching the page if `path` does not
    /// exist, and with `AssertionFailed` when no file input is visible.
    pub async fn upload_file<D: PageDriver>(
        &self,
        driver: &D,
        candidates: &[CandidateDescriptor],
        path: &Path,
    ) -> Result<usize, LocatorError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(LocatorError::FileNotFound(path.to_path_buf()));
        }

        let (handle, index) = match self.locate(driver, candidates).await? {
            LocateOutcome::Found { handle, index } => (handle, index),
            LocateOutcome::NotFound { attempted } => {
                return Err(LocatorError::AssertionFailed(format!(
                    "File input not found after trying {attempted} candidate(s)"
                )));
            }
        };
        let selector = candidates[index].selector();

        let files = [path.to_path_buf()];
        act(
            selector,
            self.options.action_timeout,
            driver.set_input_files(&handle, &files),
        )
        .await?;
        info!(index, selector, path = %path.display(), "Attached file to input");
        Ok(index)
    }
}
