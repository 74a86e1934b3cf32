//! Drag and drop with a pointer-choreography fallback
//!
//! The driver's native gesture goes first. If it fails for any non-fatal
//! reason the drop is replayed by hand: move to the source centre, press,
//! move to the target centre, release.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::CandidateDescriptor;
use crate::DragConfig;
use crate::driver::{DriverError, PageDriver, Rect};
use crate::utils::constants::{DEFAULT_DRAG_RESOLVE_MS, DEFAULT_DRAG_SETTLE_MS};
use crate::utils::{LocatorError, validate_wait_timeout};

#[derive(Error, Debug)]
pub enum DragError {
    #[error("Drag endpoint not visible: {0}")]
    NotFound(String),

    #[error("Could not get bounding boxes for drag and drop")]
    GeometryUnavailable,

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DragOptions {
    /// How long each endpoint may take to become visible.
    pub resolve_timeout: Duration,
    /// Pause after the drop so the page can register it.
    pub settle: Duration,
}

impl Default for DragOptions {
    fn default() -> Self {
        Self {
            resolve_timeout: Duration::from_millis(DEFAULT_DRAG_RESOLVE_MS),
            settle: Duration::from_millis(DEFAULT_DRAG_SETTLE_MS),
        }
    }
}

impl TryFrom<&DragConfig> for DragOptions {
    type Error = LocatorError;

    fn try_from(config: &DragConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            resolve_timeout: validate_wait_timeout(
                Some(config.resolve_timeout_ms),
                DEFAULT_DRAG_RESOLVE_MS,
            )?,
            settle: Duration::from_millis(config.settle_ms),
        })
    }
}

async fn resolve<D: PageDriver>(
    driver: &D,
    endpoint: &CandidateDescriptor,
    timeout: Duration,
) -> Result<D::Handle, DragError> {
    let resolved =
        tokio::time::timeout(timeout, driver.resolve_visible(endpoint.selector(), timeout)).await;
    match resolved {
        Ok(Ok(Some(handle))) => Ok(handle),
        Ok(Err(e)) if e.is_fatal() => Err(DragError::Driver(e)),
        Ok(Err(e)) => {
            debug!(endpoint = %endpoint, error = %e, "Drag endpoint probe failed");
            Err(DragError::NotFound(endpoint.to_string()))
        }
        Ok(Ok(None)) | Err(_) => Err(DragError::NotFound(endpoint.to_string())),
    }
}

async fn geometry<D: PageDriver>(driver: &D, handle: &D::Handle) -> Result<Rect, DragError> {
    match driver.bounding_box(handle).await {
        Ok(Some(rect)) => Ok(rect),
        Ok(None) => Err(DragError::GeometryUnavailable),
        Err(e) if e.is_fatal() => Err(DragError::Driver(e)),
        Err(e) => {
            debug!(error = %e, "Bounding box read failed");
            Err(DragError::GeometryUnavailable)
        }
    }
}

/// Drag `source` onto `target`.
///
/// The native-gesture error is logged, never returned; only the fallback's
/// outcome reaches the caller.
pub async fn drag_and_drop<D: PageDriver>(
    driver: &D,
    source: &CandidateDescriptor,
    target: &CandidateDescriptor,
    options: &DragOptions,
) -> Result<(), DragError> {
    let source_handle = resolve(driver, source, options.resolve_timeout).await?;
    let target_handle = resolve(driver, target, options.resolve_timeout).await?;

    match driver.native_drag_to(&source_handle, &target_handle).await {
        Ok(()) => {
            info!(source = %source, target = %target, "Native drag completed");
        }
        Err(e) if e.is_fatal() => return Err(DragError::Driver(e)),
        Err(e) => {
            warn!(
                source = %source,
                target = %target,
                error = %e,
                "Native drag failed, falling back to pointer choreography"
            );
            let from = geometry(driver, &source_handle).await?.center();
            let to = geometry(driver, &target_handle).await?.center();

            driver.pointer_move(from).await?;
            driver.pointer_down(from).await?;
            let dropped = match driver.pointer_move(to).await {
                Ok(()) => driver.pointer_up(to).await,
                Err(e) => Err(e),
            };
            if let Err(e) = dropped {
                // Leave no button held for the rest of the session.
                if let Err(release) = driver.pointer_up(from).await {
                    debug!(error = %release, "Releasing pointer after failed drag also failed");
                }
                return Err(DragError::Driver(e));
            }
            info!(source = %source, target = %target, "Pointer drag completed");
        }
    }

    if !options.settle.is_zero() {
        tokio::time::sleep(options.settle).await;
    }
    Ok(())
}
