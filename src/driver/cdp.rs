//! [`PageDriver`] over a chromiumoxide [`Page`]
//!
//! Selectors are plain CSS handed to `DOM.querySelector`. Engine-specific
//! syntax such as `text=Create` or `:has-text()` is rejected by Chrome and
//! surfaces as [`DriverError::InvalidSelector`], which the locator treats as
//! an absent candidate.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine as _;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
    EventResponseReceived, GetResponseBodyParams, RequestId,
};
use chromiumoxide::cdp::js_protocol::runtime::{CallArgument, CallFunctionOnParams};
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use futures::stream::{BoxStream, PollNext};
use futures::{Stream, StreamExt, future, stream};
use serde_json::Value;
use tracing::{debug, trace};

use super::{DriverError, DriverResult, ObservedResponse, PageDriver, Point, Rect};
use crate::utils::constants::SHORT_TIMEOUT;

/// Non-empty layout box and not hidden by style. Opacity does not count.
const IS_VISIBLE_JS: &str = r#"function() {
    if (!this.isConnected) return false;
    const style = window.getComputedStyle(this);
    if (style.visibility === 'hidden' || style.display === 'none') return false;
    const rect = this.getBoundingClientRect();
    return rect.width > 0 && rect.height > 0;
}"#;

const IS_ENABLED_JS: &str = r#"function() {
    return !this.disabled && this.getAttribute('aria-disabled') !== 'true';
}"#;

const CLEAR_VALUE_JS: &str = r#"function() {
    this.value = '';
    this.dispatchEvent(new Event('input', { bubbles: true }));
}"#;

/// HTML5 drag sequence sharing one DataTransfer between source and target.
///
/// Returns whether the target accepted the drag, i.e. cancelled `dragover`.
/// A target that does not is not a drop zone and gets no `drop` event.
const NATIVE_DRAG_JS: &str = r#"function(target) {
    const data = new DataTransfer();
    const fire = (el, type) => el.dispatchEvent(
        new DragEvent(type, { bubbles: true, cancelable: true, dataTransfer: data })
    );
    fire(this, 'dragstart');
    fire(target, 'dragenter');
    const accepted = !fire(target, 'dragover');
    if (accepted) fire(target, 'drop');
    fire(this, 'dragend');
    return accepted;
}"#;

/// Starting poll interval; doubles per retry up to `MAX_POLL_INTERVAL`.
const INITIAL_POLL_INTERVAL: Duration = Duration::from_millis(100);
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(1);

fn map_cdp_error(error: CdpError) -> DriverError {
    match &error {
        CdpError::Ws(_) | CdpError::ChannelSendError(_) => {
            DriverError::SessionClosed(error.to_string())
        }
        _ => DriverError::Probe(error.to_string()),
    }
}

fn map_selector_error(selector: &str, error: CdpError) -> DriverError {
    match map_cdp_error(error) {
        DriverError::Probe(reason)
            if reason.contains("not a valid selector")
                || reason.contains("DOM Error while querying") =>
        {
            DriverError::InvalidSelector {
                selector: selector.to_string(),
                reason,
            }
        }
        other => other,
    }
}

enum NetworkEvent {
    Request(Arc<EventRequestWillBeSent>),
    Response(Arc<EventResponseReceived>),
}

/// How a request's body download ended.
#[derive(Debug, Clone, PartialEq)]
enum Loading {
    Finished,
    Failed(String),
}

/// Interpret the drag script's return value.
fn drop_accepted(returned: Option<&Value>) -> DriverResult<()> {
    match returned.and_then(Value::as_bool) {
        Some(true) => Ok(()),
        _ => Err(DriverError::Probe(
            "drop target did not accept the drag".to_string(),
        )),
    }
}

/// Next loading outcome for `request_id`, or `None` if the events end first.
async fn loading_outcome<S>(events: &mut S, request_id: &str) -> Option<Loading>
where
    S: Stream<Item = (String, Loading)> + Unpin,
{
    while let Some((id, loading)) = events.next().await {
        if id == request_id {
            return Some(loading);
        }
    }
    None
}

/// Driver for one chromiumoxide page.
#[derive(Debug, Clone)]
pub struct CdpDriver {
    page: Page,
}

impl CdpDriver {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Evaluate a boolean JS predicate with the element as `this`.
    ///
    /// Non-fatal evaluation errors read as `false`.
    async fn check(&self, element: &Element, predicate: &str) -> DriverResult<bool> {
        match element.call_js_fn(predicate, false).await {
            Ok(returns) => Ok(returns
                .result
                .value
                .and_then(|v| v.as_bool())
                .unwrap_or(false)),
            Err(e) => {
                let error = map_cdp_error(e);
                if error.is_fatal() {
                    return Err(error);
                }
                trace!(error = %error, "Element check failed");
                Ok(false)
            }
        }
    }

    /// Poll `predicate` with exponential backoff until true or `timeout`.
    async fn poll_check(
        &self,
        element: &Element,
        predicate: &str,
        timeout: Duration,
    ) -> DriverResult<bool> {
        let start = Instant::now();
        let mut poll_interval = INITIAL_POLL_INTERVAL;

        loop {
            if self.check(element, predicate).await? {
                return Ok(true);
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Ok(false);
            }
            tokio::time::sleep(poll_interval.min(timeout - elapsed)).await;
            poll_interval = (poll_interval * 2).min(MAX_POLL_INTERVAL);
        }
    }

    async fn fetch_body(&self, request_id: &str) -> DriverResult<String> {
        let params = GetResponseBodyParams::new(RequestId::new(request_id.to_string()));
        let reply = self.page.execute(params).await.map_err(|e| match map_cdp_error(e) {
            DriverError::Probe(reason) => DriverError::Read(reason),
            other => other,
        })?;

        if reply.result.base64_encoded {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(&reply.result.body)
                .map_err(|e| DriverError::Read(format!("invalid base64 body: {e}")))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        } else {
            Ok(reply.result.body.clone())
        }
    }

    async fn dispatch_mouse(&self, kind: DispatchMouseEventType, at: Point) -> DriverResult<()> {
        let mut params = DispatchMouseEventParams::new(kind.clone(), at.x, at.y);
        if kind != DispatchMouseEventType::MouseMoved {
            params.button = Some(MouseButton::Left);
            params.click_count = Some(1);
        }
        self.page.execute(params).await.map_err(map_cdp_error)?;
        Ok(())
    }
}

#[async_trait]
impl PageDriver for CdpDriver {
    type Handle = Element;

    /// Polls for SPAs that render after the load event: 100ms, doubling,
    /// capped at 1s between attempts.
    async fn resolve_visible(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> DriverResult<Option<Element>> {
        let start = Instant::now();
        let mut poll_interval = INITIAL_POLL_INTERVAL;

        loop {
            match self.page.find_element(selector).await {
                Ok(element) => {
                    if self.check(&element, IS_VISIBLE_JS).await? {
                        return Ok(Some(element));
                    }
                }
                Err(e) => match map_selector_error(selector, e) {
                    error @ (DriverError::SessionClosed(_) | DriverError::InvalidSelector { .. }) => {
                        return Err(error);
                    }
                    error => trace!(selector, error = %error, "Element not present yet"),
                },
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Ok(None);
            }
            tokio::time::sleep(poll_interval.min(timeout - elapsed)).await;
            poll_interval = (poll_interval * 2).min(MAX_POLL_INTERVAL);
        }
    }

    async fn query_all(&self, selector: &str) -> DriverResult<Vec<Element>> {
        self.page
            .find_elements(selector)
            .await
            .map_err(|e| map_selector_error(selector, e))
    }

    async fn is_visible(&self, handle: &Element, timeout: Duration) -> DriverResult<bool> {
        self.poll_check(handle, IS_VISIBLE_JS, timeout).await
    }

    async fn is_enabled(&self, handle: &Element, timeout: Duration) -> DriverResult<bool> {
        self.poll_check(handle, IS_ENABLED_JS, timeout).await
    }

    async fn read_text(&self, handle: &Element) -> DriverResult<String> {
        match handle.inner_text().await {
            Ok(text) => Ok(text.unwrap_or_default()),
            Err(e) => match map_cdp_error(e) {
                DriverError::Probe(reason) => Err(DriverError::Read(reason)),
                other => Err(other),
            },
        }
    }

    /// Scroll into view and click the element's clickable point. Clicking by
    /// point avoids chromiumoxide's IntersectionObserver wait.
    async fn click(&self, handle: &Element, timeout: Duration) -> DriverResult<()> {
        let click = async {
            handle.scroll_into_view().await.map_err(map_cdp_error)?;
            let point = handle.clickable_point().await.map_err(map_cdp_error)?;
            self.page.click(point).await.map_err(map_cdp_error)?;
            Ok::<(), DriverError>(())
        };
        tokio::time::timeout(timeout, click)
            .await
            .map_err(|_| DriverError::Timeout(timeout))?
    }

    async fn fill(&self, handle: &Element, text: &str) -> DriverResult<()> {
        handle.scroll_into_view().await.map_err(map_cdp_error)?;
        let point = handle.clickable_point().await.map_err(map_cdp_error)?;
        self.page.click(point).await.map_err(map_cdp_error)?;
        handle
            .call_js_fn(CLEAR_VALUE_JS, false)
            .await
            .map_err(map_cdp_error)?;
        handle.type_str(text).await.map_err(map_cdp_error)?;
        Ok(())
    }

    async fn set_input_files(&self, handle: &Element, files: &[PathBuf]) -> DriverResult<()> {
        let files: Vec<String> = files
            .iter()
            .map(|path| path.to_string_lossy().into_owned())
            .collect();
        let mut params = SetFileInputFilesParams::new(files);
        params.backend_node_id = Some(handle.backend_node_id);
        self.page.execute(params).await.map_err(map_cdp_error)?;
        Ok(())
    }

    async fn bounding_box(&self, handle: &Element) -> DriverResult<Option<Rect>> {
        match handle.bounding_box().await {
            Ok(bbox) if bbox.width > 0.0 && bbox.height > 0.0 => {
                Ok(Some(Rect::new(bbox.x, bbox.y, bbox.width, bbox.height)))
            }
            Ok(_) => Ok(None),
            Err(e) => {
                let error = map_cdp_error(e);
                if error.is_fatal() {
                    return Err(error);
                }
                debug!(error = %error, "No bounding box for element");
                Ok(None)
            }
        }
    }

    async fn native_drag_to(&self, source: &Element, target: &Element) -> DriverResult<()> {
        let mut params = CallFunctionOnParams::new(NATIVE_DRAG_JS);
        params.object_id = Some(source.remote_object_id.clone());
        params.arguments = Some(vec![CallArgument {
            value: None,
            unserializable_value: None,
            object_id: Some(target.remote_object_id.clone()),
        }]);
        params.await_promise = Some(false);

        let reply = self.page.execute(params).await.map_err(map_cdp_error)?;
        if let Some(exception) = &reply.result.exception_details {
            return Err(DriverError::Probe(format!(
                "drag script threw: {}",
                exception.text
            )));
        }
        drop_accepted(reply.result.result.value.as_ref())
    }

    async fn pointer_move(&self, at: Point) -> DriverResult<()> {
        self.dispatch_mouse(DispatchMouseEventType::MouseMoved, at)
            .await
    }

    async fn pointer_down(&self, at: Point) -> DriverResult<()> {
        self.dispatch_mouse(DispatchMouseEventType::MousePressed, at)
            .await
    }

    async fn pointer_up(&self, at: Point) -> DriverResult<()> {
        self.dispatch_mouse(DispatchMouseEventType::MouseReleased, at)
            .await
    }

    /// Joins `requestWillBeSent` (method) with `responseReceived` (status,
    /// url) by request id. Request events are drained first so a response
    /// never overtakes its own request.
    async fn responses(&self) -> DriverResult<BoxStream<'static, ObservedResponse>> {
        self.page
            .execute(EnableParams::default())
            .await
            .map_err(map_cdp_error)?;

        let requests = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(map_cdp_error)?
            .map(NetworkEvent::Request);
        let responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(map_cdp_error)?
            .map(NetworkEvent::Response);

        let observed = stream::select_with_strategy(requests, responses, |_: &mut ()| PollNext::Left)
            .scan(HashMap::<String, String>::new(), |methods, event| {
                let observed = match event {
                    NetworkEvent::Request(request) => {
                        methods.insert(
                            request.request_id.inner().clone(),
                            request.request.method.clone(),
                        );
                        None
                    }
                    NetworkEvent::Response(response) => {
                        let request_id = response.request_id.inner().clone();
                        Some(ObservedResponse {
                            method: methods.remove(&request_id).unwrap_or_default(),
                            url: response.response.url.clone(),
                            status: u16::try_from(response.response.status).unwrap_or_default(),
                            request_id,
                        })
                    }
                };
                future::ready(Some(observed))
            })
            .filter_map(future::ready)
            .boxed();

        Ok(observed)
    }

    /// Chrome keeps no body until `loadingFinished`. Listeners are attached
    /// before the first read so a download finishing in between is not missed.
    async fn response_body(&self, response: &ObservedResponse) -> DriverResult<String> {
        let finished = self
            .page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(map_cdp_error)?
            .map(|event| (event.request_id.inner().clone(), Loading::Finished));
        let failed = self
            .page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(map_cdp_error)?
            .map(|event| {
                (
                    event.request_id.inner().clone(),
                    Loading::Failed(event.error_text.clone()),
                )
            });
        let mut loading = stream::select(finished, failed);

        match self.fetch_body(&response.request_id).await {
            Ok(body) => return Ok(body),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => trace!(url = %response.url, error = %e, "Body not ready, waiting for loadingFinished"),
        }

        match tokio::time::timeout(
            SHORT_TIMEOUT,
            loading_outcome(&mut loading, &response.request_id),
        )
        .await
        {
            Ok(Some(Loading::Finished)) => {}
            Ok(Some(Loading::Failed(reason))) => {
                return Err(DriverError::Read(format!("loading failed: {reason}")));
            }
            Ok(None) => {
                return Err(DriverError::SessionClosed(
                    "network events ended".to_string(),
                ));
            }
            Err(_) => debug!(url = %response.url, "No loadingFinished seen, reading body anyway"),
        }
        self.fetch_body(&response.request_id).await
    }
}
