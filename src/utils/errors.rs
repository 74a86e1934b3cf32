use std::path::PathBuf;

use thiserror::Error;

use crate::driver::DriverError;

/// Errors surfaced by locator operations
///
/// Absence is never one of these; `NotFound` is a value.
#[derive(Error, Debug)]
pub enum LocatorError {
    #[error("Candidate list is empty")]
    EmptyCandidates,

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Only fatal driver errors cross the locator boundary.
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// The element was found but acting on it failed.
    #[error("Action on '{selector}' failed: {source}")]
    ActionFailed {
        selector: String,
        #[source]
        source: DriverError,
    },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("File not found at path: {}", .0.display())]
    FileNotFound(PathBuf),
}
