//! In-memory page driver for exercising the locator and correlator without a browser
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{StreamExt, future};
use resilient_locator::{DriverError, DriverResult, ObservedResponse, PageDriver, Point, Rect};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

#[derive(Debug, Clone, PartialEq)]
pub struct FakeElement {
    /// `None` makes text reads fail.
    pub text: Option<String>,
    pub visible: bool,
    pub enabled: bool,
    pub bbox: Option<Rect>,
    pub click_fails: bool,
}

impl FakeElement {
    pub fn visible(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            visible: true,
            enabled: true,
            bbox: Some(Rect::new(0.0, 0.0, 10.0, 10.0)),
            click_fails: false,
        }
    }

    pub fn hidden(text: &str) -> Self {
        Self {
            visible: false,
            bbox: None,
            ..Self::visible(text)
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn unreadable(mut self) -> Self {
        self.text = None;
        self
    }

    pub fn with_box(mut self, bbox: Option<Rect>) -> Self {
        self.bbox = bbox;
        self
    }

    pub fn failing_click(mut self) -> Self {
        self.click_fails = true;
        self
    }
}

/// What `resolve_visible` does for a selector.
#[derive(Debug, Clone)]
pub enum Behavior {
    Element(FakeElement),
    /// Selector the engine cannot parse.
    Invalid,
    /// Transient failure of this one probe.
    Flaky,
    /// Browser gone.
    Fatal,
    /// Never answers.
    Hang,
}

#[derive(Debug, Clone)]
pub struct FakeHandle {
    pub selector: String,
    pub element: FakeElement,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Click(String),
    Fill(String, String),
    Files(String, Vec<PathBuf>),
    NativeDrag(String, String),
    PointerMove(Point),
    PointerDown(Point),
    PointerUp(Point),
}

#[derive(Debug, Clone)]
pub enum NativeDrag {
    Works,
    Fails,
    Fatal,
}

pub struct FakeDriver {
    behaviors: HashMap<String, Behavior>,
    lists: HashMap<String, Result<Vec<FakeElement>, DriverError>>,
    bodies: HashMap<String, DriverResult<String>>,
    body_delay: Duration,
    pointer_move_fails_at: Option<Point>,
    native_drag: NativeDrag,
    probes: Mutex<Vec<String>>,
    events: Mutex<Vec<Event>>,
    network: Mutex<Option<broadcast::Sender<ObservedResponse>>>,
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDriver {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            behaviors: HashMap::new(),
            lists: HashMap::new(),
            bodies: HashMap::new(),
            body_delay: Duration::ZERO,
            pointer_move_fails_at: None,
            native_drag: NativeDrag::Works,
            probes: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            network: Mutex::new(Some(tx)),
        }
    }

    pub fn with(mut self, selector: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(selector.to_string(), behavior);
        self
    }

    pub fn with_element(self, selector: &str, element: FakeElement) -> Self {
        self.with(selector, Behavior::Element(element))
    }

    pub fn with_list(mut self, selector: &str, elements: Vec<FakeElement>) -> Self {
        self.lists.insert(selector.to_string(), Ok(elements));
        self
    }

    pub fn with_failing_list(mut self, selector: &str, error: DriverError) -> Self {
        self.lists.insert(selector.to_string(), Err(error));
        self
    }

    pub fn with_body(mut self, request_id: &str, body: DriverResult<String>) -> Self {
        self.bodies.insert(request_id.to_string(), body);
        self
    }

    /// Delay every body read, as a download still in flight would.
    pub fn with_body_delay(mut self, delay: Duration) -> Self {
        self.body_delay = delay;
        self
    }

    /// Make `pointer_move` to `at` fail.
    pub fn with_pointer_move_failing_at(mut self, at: Point) -> Self {
        self.pointer_move_fails_at = Some(at);
        self
    }

    pub fn with_native_drag(mut self, native_drag: NativeDrag) -> Self {
        self.native_drag = native_drag;
        self
    }

    /// Selectors passed to `resolve_visible`, in call order.
    pub fn probes(&self) -> Vec<String> {
        self.probes.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Deliver a response to every current subscriber.
    pub fn emit(&self, response: ObservedResponse) {
        if let Some(tx) = self.network.lock().unwrap().as_ref() {
            let _ = tx.send(response);
        }
    }

    /// End all response streams, as a closed session would.
    pub fn close_network(&self) {
        self.network.lock().unwrap().take();
    }

    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn response(request_id: &str, method: &str, url: &str, status: u16) -> ObservedResponse {
    ObservedResponse {
        request_id: request_id.to_string(),
        method: method.to_string(),
        url: url.to_string(),
        status,
    }
}

#[async_trait]
impl PageDriver for FakeDriver {
    type Handle = FakeHandle;

    async fn resolve_visible(
        &self,
        selector: &str,
        _timeout: Duration,
    ) -> DriverResult<Option<FakeHandle>> {
        self.probes.lock().unwrap().push(selector.to_string());
        match self.behaviors.get(selector).cloned() {
            Some(Behavior::Element(element)) if element.visible => Ok(Some(FakeHandle {
                selector: selector.to_string(),
                element,
            })),
            Some(Behavior::Element(_)) | None => Ok(None),
            Some(Behavior::Invalid) => Err(DriverError::InvalidSelector {
                selector: selector.to_string(),
                reason: "not a valid selector".to_string(),
            }),
            Some(Behavior::Flaky) => Err(DriverError::Probe("execution context destroyed".into())),
            Some(Behavior::Fatal) => Err(DriverError::SessionClosed("target closed".into())),
            Some(Behavior::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(None)
            }
        }
    }

    async fn query_all(&self, selector: &str) -> DriverResult<Vec<FakeHandle>> {
        match self.lists.get(selector).cloned() {
            Some(Ok(elements)) => Ok(elements
                .into_iter()
                .map(|element| FakeHandle {
                    selector: selector.to_string(),
                    element,
                })
                .collect()),
            Some(Err(e)) => Err(e),
            None => Ok(Vec::new()),
        }
    }

    async fn is_visible(&self, handle: &FakeHandle, _timeout: Duration) -> DriverResult<bool> {
        Ok(handle.element.visible)
    }

    async fn is_enabled(&self, handle: &FakeHandle, _timeout: Duration) -> DriverResult<bool> {
        Ok(handle.element.enabled)
    }

    async fn read_text(&self, handle: &FakeHandle) -> DriverResult<String> {
        handle
            .element
            .text
            .clone()
            .ok_or_else(|| DriverError::Read("node detached".into()))
    }

    async fn click(&self, handle: &FakeHandle, _timeout: Duration) -> DriverResult<()> {
        if handle.element.click_fails {
            return Err(DriverError::Probe("element is obscured".into()));
        }
        self.record(Event::Click(handle.selector.clone()));
        Ok(())
    }

    async fn fill(&self, handle: &FakeHandle, text: &str) -> DriverResult<()> {
        self.record(Event::Fill(handle.selector.clone(), text.to_string()));
        Ok(())
    }

    async fn set_input_files(&self, handle: &FakeHandle, files: &[PathBuf]) -> DriverResult<()> {
        self.record(Event::Files(handle.selector.clone(), files.to_vec()));
        Ok(())
    }

    async fn bounding_box(&self, handle: &FakeHandle) -> DriverResult<Option<Rect>> {
        Ok(handle.element.bbox)
    }

    async fn native_drag_to(&self, source: &FakeHandle, target: &FakeHandle) -> DriverResult<()> {
        match self.native_drag {
            NativeDrag::Works => {
                self.record(Event::NativeDrag(
                    source.selector.clone(),
                    target.selector.clone(),
                ));
                Ok(())
            }
            NativeDrag::Fails => Err(DriverError::Probe("drag gesture not supported".into())),
            NativeDrag::Fatal => Err(DriverError::SessionClosed("target closed".into())),
        }
    }

    async fn pointer_move(&self, at: Point) -> DriverResult<()> {
        if self.pointer_move_fails_at == Some(at) {
            return Err(DriverError::Probe("mouse event rejected".into()));
        }
        self.record(Event::PointerMove(at));
        Ok(())
    }

    async fn pointer_down(&self, at: Point) -> DriverResult<()> {
        self.record(Event::PointerDown(at));
        Ok(())
    }

    async fn pointer_up(&self, at: Point) -> DriverResult<()> {
        self.record(Event::PointerUp(at));
        Ok(())
    }

    async fn responses(&self) -> DriverResult<BoxStream<'static, ObservedResponse>> {
        let guard = self.network.lock().unwrap();
        let Some(tx) = guard.as_ref() else {
            return Err(DriverError::SessionClosed("network closed".into()));
        };
        Ok(BroadcastStream::new(tx.subscribe())
            .filter_map(|item| future::ready(item.ok()))
            .boxed())
    }

    async fn response_body(&self, response: &ObservedResponse) -> DriverResult<String> {
        if !self.body_delay.is_zero() {
            tokio::time::sleep(self.body_delay).await;
        }
        self.bodies
            .get(&response.request_id)
            .cloned()
            .unwrap_or_else(|| Ok(String::new()))
    }
}
