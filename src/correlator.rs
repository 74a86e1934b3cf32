//! Network response correlation
//!
//! Waits for the next response whose method and URL satisfy a predicate.
//! A timeout is an ordinary outcome: the action just performed may or may not
//! be backed by a network call.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::driver::{DriverError, ObservedResponse, PageDriver};
use crate::utils::constants::MEDIUM_TIMEOUT;
use crate::utils::{MAX_WAIT_TIMEOUT_MS, check_duration};

/// Pure predicate over (HTTP method, URL).
#[derive(Clone)]
pub struct ResponsePredicate {
    matcher: Arc<dyn Fn(&str, &str) -> bool + Send + Sync>,
}

impl ResponsePredicate {
    pub fn new<F>(matcher: F) -> Self
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        Self {
            matcher: Arc::new(matcher),
        }
    }

    /// Matches every response.
    pub fn any() -> Self {
        Self::new(|_, _| true)
    }

    /// Method is one of `methods`, compared case-insensitively.
    pub fn methods<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let methods: Vec<String> = methods
            .into_iter()
            .map(|m| m.as_ref().to_uppercase())
            .collect();
        Self::new(move |method, _| {
            let method = method.to_uppercase();
            methods.iter().any(|m| *m == method)
        })
    }

    /// URL contains `needle`, compared case-insensitively.
    pub fn url_contains(needle: impl AsRef<str>) -> Self {
        let needle = needle.as_ref().to_lowercase();
        Self::new(move |_, url| url.to_lowercase().contains(&needle))
    }

    pub fn url_matches(pattern: Regex) -> Self {
        Self::new(move |_, url| pattern.is_match(url))
    }

    pub fn and(self, other: ResponsePredicate) -> Self {
        Self::new(move |method, url| self.matches(method, url) && other.matches(method, url))
    }

    pub fn matches(&self, method: &str, url: &str) -> bool {
        (self.matcher)(method, url)
    }
}

impl fmt::Debug for ResponsePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponsePredicate").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelationOutcome {
    Matched {
        status: u16,
        method: String,
        url: String,
        /// Empty when the body could not be read.
        body: String,
    },
    TimedOut,
}

impl CorrelationOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, CorrelationOutcome::Matched { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            CorrelationOutcome::Matched { status, .. } => Some(*status),
            CorrelationOutcome::TimedOut => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum CorrelationError {
    /// A response matched but was not 2xx.
    #[error("Expected a 2xx response, got {status} for {method} {url}")]
    UnexpectedStatus {
        status: u16,
        method: String,
        url: String,
    },

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),
}

/// A subscription armed before the triggering action.
///
/// Responses that arrive between [`arm`] and [`PendingResponse::wait`] are
/// still seen. Dropping it discards the subscription.
pub struct PendingResponse<'a, D: PageDriver> {
    driver: &'a D,
    predicate: ResponsePredicate,
    responses: BoxStream<'static, ObservedResponse>,
}

impl<D: PageDriver> fmt::Debug for PendingResponse<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingResponse")
            .field("predicate", &self.predicate)
            .finish_non_exhaustive()
    }
}

impl<D: PageDriver> PendingResponse<'_, D> {
    /// Wait up to `timeout` for the first matching response.
    pub async fn wait(self, timeout: Duration) -> Result<CorrelationOutcome, CorrelationError> {
        check_duration("Correlation timeout", timeout, MAX_WAIT_TIMEOUT_MS)
            .map_err(|e| CorrelationError::InvalidArguments(e.to_string()))?;

        let PendingResponse {
            driver,
            predicate,
            mut responses,
        } = self;
        let next_match = async {
            while let Some(response) = responses.next().await {
                if predicate.matches(&response.method, &response.url) {
                    return Some(response);
                }
                debug!(method = %response.method, url = %response.url, "Ignoring unrelated response");
            }
            None
        };

        let response = match tokio::time::timeout(timeout, next_match).await {
            Ok(Some(response)) => response,
            Ok(None) => {
                return Err(CorrelationError::Driver(DriverError::SessionClosed(
                    "response stream ended".to_string(),
                )));
            }
            Err(_) => {
                info!(timeout_ms = timeout.as_millis() as u64, "No matching response captured within timeout");
                return Ok(CorrelationOutcome::TimedOut);
            }
        };

        let body = match tokio::time::timeout(MEDIUM_TIMEOUT, driver.response_body(&response)).await {
            Ok(Ok(body)) => body,
            Ok(Err(e)) if e.is_fatal() => return Err(CorrelationError::Driver(e)),
            Ok(Err(e)) => {
                warn!(url = %response.url, error = %e, "Response body unreadable, using empty body");
                String::new()
            }
            Err(_) => {
                warn!(url = %response.url, "Response body read timed out, using empty body");
                String::new()
            }
        };

        info!(
            status = response.status,
            method = %response.method,
            url = %response.url,
            "Matched response"
        );
        Ok(CorrelationOutcome::Matched {
            status: response.status,
            method: response.method,
            url: response.url,
            body,
        })
    }

    /// Like [`wait`](Self::wait), but a matched non-2xx response is an error.
    pub async fn wait_successful(
        self,
        timeout: Duration,
    ) -> Result<CorrelationOutcome, CorrelationError> {
        let outcome = self.wait(timeout).await?;
        if let CorrelationOutcome::Matched {
            status,
            method,
            url,
            ..
        } = &outcome
            && !(200..300).contains(status)
        {
            return Err(CorrelationError::UnexpectedStatus {
                status: *status,
                method: method.clone(),
                url: url.clone(),
            });
        }
        Ok(outcome)
    }
}

/// Subscribe to responses now; wait for a match later.
pub async fn arm<D: PageDriver>(
    driver: &D,
    predicate: ResponsePredicate,
) -> Result<PendingResponse<'_, D>, CorrelationError> {
    let responses = driver.responses().await?;
    Ok(PendingResponse {
        driver,
        predicate,
        responses,
    })
}

/// Wait for the next response matching `predicate`.
pub async fn await_matching<D: PageDriver>(
    driver: &D,
    predicate: ResponsePredicate,
    timeout: Duration,
) -> Result<CorrelationOutcome, CorrelationError> {
    arm(driver, predicate).await?.wait(timeout).await
}

/// Wait for the next matching response and require a 2xx status.
pub async fn await_successful<D: PageDriver>(
    driver: &D,
    predicate: ResponsePredicate,
    timeout: Duration,
) -> Result<CorrelationOutcome, CorrelationError> {
    arm(driver, predicate).await?.wait_successful(timeout).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_filter_is_case_insensitive() {
        let predicate = ResponsePredicate::methods(["post", "PUT"]);
        assert!(predicate.matches("POST", "https://host/api"));
        assert!(predicate.matches("put", "https://host/api"));
        assert!(!predicate.matches("GET", "https://host/api"));
    }

    #[test]
    fn url_contains_lowercases_url() {
        let predicate = ResponsePredicate::url_contains("Upload");
        assert!(predicate.matches("POST", "https://host/API/UPLOAD?x=1"));
        assert!(!predicate.matches("POST", "https://host/api/ping"));
    }

    #[test]
    fn combined_predicate() {
        let predicate = ResponsePredicate::methods(["POST", "PUT", "PATCH"])
            .and(ResponsePredicate::url_matches(Regex::new(r"(?i)save|form").unwrap()));
        assert!(predicate.matches("PATCH", "https://host/forms/42"));
        assert!(!predicate.matches("GET", "https://host/forms/42"));
        assert!(!predicate.matches("POST", "https://host/ping"));
    }

    #[test]
    fn outcome_accessors() {
        let matched = CorrelationOutcome::Matched {
            status: 201,
            method: "POST".into(),
            url: "/api/upload".into(),
            body: String::new(),
        };
        assert!(matched.is_matched());
        assert_eq!(matched.status(), Some(201));
        assert_eq!(CorrelationOutcome::TimedOut.status(), None);
    }
}
