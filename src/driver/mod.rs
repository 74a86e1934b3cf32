//! Page driver capability consumed by the locator and the correlator
//!
//! The driver owns the live page: element handles, input dispatch and the
//! network event feed. Nothing in this crate keeps a handle past the call
//! that produced it.

pub mod cdp;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

pub use cdp::CdpDriver;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The selector could not be parsed or evaluated by the driver.
    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// A single query failed; the page is still usable.
    #[error("Probe failed: {0}")]
    Probe(String),

    #[error("Driver operation timed out after {0:?}")]
    Timeout(Duration),

    /// Text or body could not be read.
    #[error("Read failed: {0}")]
    Read(String),

    /// Browser or session is gone. Nothing further can succeed on this page.
    #[error("Browser session closed: {0}")]
    SessionClosed(String),
}

impl DriverError {
    /// Fatal errors end the scenario; everything else is scoped to one probe.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DriverError::SessionClosed(_))
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Element bounding geometry in CSS pixels, page coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// A network response as seen on the wire.
///
/// `request_id` is the driver's own key for reading the body later; callers
/// treat it as opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedResponse {
    pub request_id: String,
    pub method: String,
    pub url: String,
    pub status: u16,
}

/// Query and manipulate one live page.
///
/// Implementations serialize the underlying browser commands themselves; the
/// locator and correlator may hold several of these futures over one driver
/// in sequence but never share mutable state through it.
#[async_trait]
pub trait PageDriver: Send + Sync {
    type Handle: Send + Sync;

    /// Resolve `selector` to its first element once that element is visible.
    ///
    /// `Ok(None)` when nothing visible turned up within `timeout`.
    async fn resolve_visible(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> DriverResult<Option<Self::Handle>>;

    /// All elements currently matching `selector`, visible or not.
    async fn query_all(&self, selector: &str) -> DriverResult<Vec<Self::Handle>>;

    async fn is_visible(&self, handle: &Self::Handle, timeout: Duration) -> DriverResult<bool>;

    async fn is_enabled(&self, handle: &Self::Handle, timeout: Duration) -> DriverResult<bool>;

    async fn read_text(&self, handle: &Self::Handle) -> DriverResult<String>;

    async fn click(&self, handle: &Self::Handle, timeout: Duration) -> DriverResult<()>;

    /// Replace the element's value with `text`.
    async fn fill(&self, handle: &Self::Handle, text: &str) -> DriverResult<()>;

    async fn set_input_files(&self, handle: &Self::Handle, files: &[PathBuf]) -> DriverResult<()>;

    /// `Ok(None)` when the element has no layout box (detached, `display: none`).
    async fn bounding_box(&self, handle: &Self::Handle) -> DriverResult<Option<Rect>>;

    async fn native_drag_to(&self, source: &Self::Handle, target: &Self::Handle)
    -> DriverResult<()>;

    async fn pointer_move(&self, at: Point) -> DriverResult<()>;

    async fn pointer_down(&self, at: Point) -> DriverResult<()>;

    async fn pointer_up(&self, at: Point) -> DriverResult<()>;

    /// Subscribe to responses observed from now on.
    ///
    /// The stream ends when the session goes away.
    async fn responses(&self) -> DriverResult<BoxStream<'static, ObservedResponse>>;

    async fn response_body(&self, response: &ObservedResponse) -> DriverResult<String>;
}
