//! Attaching to an already running Chrome over the DevTools protocol
//!
//! The browser process belongs to the caller. This module only owns the CDP
//! connection and its event handler task.

mod session;

pub use session::BrowserSession;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Failed to connect to browser: {0}")]
    ConnectFailed(String),

    #[error("Failed to create page: {0}")]
    PageCreationFailed(String),
}

pub type BrowserResult<T> = Result<T, BrowserError>;
