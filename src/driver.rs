//! Browser session lifecycle over the Chrome DevTools Protocol.
//!
//! One [`BrowserSession`] is opened per test case and owns a headless
//! Chrome process, a single page, and the CDP handler task. The session
//! is never shared across test cases; the Test Case Runner closes it on
//! every exit path.

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors launching or operating the browser
#[derive(Debug)]
pub enum DriverError {
    /// Browser process failed to launch
    Launch(String),
    /// CDP-level failure
    Cdp(String),
}

impl std::fmt::Display for DriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverError::Launch(msg) => write!(f, "Browser launch failed: {}", msg),
            DriverError::Cdp(msg) => write!(f, "Browser protocol error: {}", msg),
        }
    }
}

impl std::error::Error for DriverError {}

/// An exclusive browser session for one test case.
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler_handle: JoinHandle<()>,
}

impl BrowserSession {
    /// Launch a Chrome process and open a blank page.
    pub async fn launch(headless: bool) -> DriverResult<Self> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .window_size(1280, 720);
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(DriverError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        // The handler task pumps CDP WebSocket messages until the
        // connection drops.
        let handler_handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::Cdp(e.to_string()))?;

        Ok(Self {
            browser,
            page,
            handler_handle,
        })
    }

    /// The single page this session drives.
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Shut the browser down. Close errors are logged, not propagated:
    /// by this point the run outcome is already decided.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            eprintln!("Warning: error closing browser: {}", e);
        }
        let _ = self.browser.wait().await;
        self.handler_handle.abort();
    }
}
