use chromiumoxide::browser::Browser;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::{self, JoinHandle};
use tracing::{error, info, trace};

use super::{BrowserError, BrowserResult};
use crate::driver::CdpDriver;

/// CDP connection plus its handler task
///
/// The handler MUST keep running for any page command to complete; it is
/// aborted when the session is dropped.
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    /// Connect to a browser's DevTools websocket, e.g.
    /// `ws://127.0.0.1:9222/devtools/browser/<id>`.
    pub async fn connect(ws_url: &str) -> BrowserResult<Self> {
        info!("Connecting to browser at {}", ws_url);
        let (browser, mut handler) = Browser::connect(ws_url)
            .await
            .map_err(|e| BrowserError::ConnectFailed(e.to_string()))?;

        let handler = task::spawn(async move {
            while let Some(h) = handler.next().await {
                if let Err(e) = h {
                    let error_msg = e.to_string();

                    // Chrome emits CDP events chromiumoxide cannot deserialize;
                    // those do not affect the session.
                    let is_benign_serialization_error = error_msg
                        .contains("data did not match any variant of untagged enum Message")
                        || error_msg.contains("Failed to deserialize WS response");

                    if is_benign_serialization_error {
                        trace!("Suppressed benign CDP serialization error: {}", error_msg);
                    } else {
                        error!("Browser handler error: {:?}", e);
                    }
                }
            }
            info!("Browser handler task completed");
        });

        Ok(Self { browser, handler })
    }

    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    /// First open page, or a fresh `about:blank` if none is open.
    pub async fn current_page(&self) -> BrowserResult<Page> {
        let pages = self
            .browser
            .pages()
            .await
            .map_err(|e| BrowserError::PageCreationFailed(e.to_string()))?;

        if let Some(page) = pages.into_iter().next() {
            Ok(page)
        } else {
            self.browser
                .new_page("about:blank")
                .await
                .map_err(|e| BrowserError::PageCreationFailed(e.to_string()))
        }
    }

    /// Driver bound to the current page.
    pub async fn driver(&self) -> BrowserResult<CdpDriver> {
        Ok(CdpDriver::new(self.current_page().await?))
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        info!("Dropping BrowserSession - aborting handler task");
        self.handler.abort();
    }
}
