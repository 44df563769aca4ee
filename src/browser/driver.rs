use std::process::Child;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::time::sleep;

use super::launcher::BrowserLauncher;
use crate::config::Config;
use crate::error::{Result, WayfarerError};

/// The narrow seam to the browser-automation collaborator. The exploration
/// engine only ever talks to a page through this trait, which keeps the
/// engine testable against a scripted fake.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate the page to a URL
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Evaluate a script in the page, returning its JSON value
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// The page's current URL
    async fn current_url(&self) -> Result<String>;

    /// Dispatch a full mouse click at viewport coordinates
    async fn click_at(&self, x: f64, y: f64) -> Result<()>;

    /// Move the mouse to viewport coordinates without clicking
    async fn hover_at(&self, x: f64, y: f64) -> Result<()>;

    /// Wait until the document settles or the timeout expires. Expiry is
    /// not an error; callers proceed with whatever state the page is in.
    async fn wait_for_load(&self, timeout: Duration) -> Result<()>;

    /// Inject a cookie scoped to the given URL
    async fn set_cookie(&self, name: &str, value: &str, url: &str) -> Result<()>;
}

/// Owns the launched browser process and its CDP connection. Each
/// exploration run gets a fresh page from here, so state cannot leak
/// between runs.
pub struct BrowserHandle {
    browser: Browser,
    handler_task: tokio::task::JoinHandle<()>,
    child: Child,
}

impl BrowserHandle {
    /// Launch a browser per the configuration and connect over CDP
    pub async fn launch(config: &Config) -> Result<Self> {
        let launcher = BrowserLauncher::from_config(config)?;
        let (child, cdp_url) = launcher.launch_and_wait().await?;

        let (browser, mut handler) = match Browser::connect(&cdp_url).await {
            Ok(pair) => pair,
            Err(e) => {
                // Do not leave an orphaned browser process behind
                abandon(child);
                return Err(WayfarerError::CdpConnectionFailed(format!(
                    "Failed to connect to browser: {}",
                    e
                )));
            }
        };

        // Drive CDP events for the lifetime of the connection
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        Ok(Self {
            browser,
            handler_task,
            child,
        })
    }

    /// Create a fresh page for one exploration run
    pub async fn new_page(&self) -> Result<CdpDriver> {
        let page = self.browser.new_page("about:blank").await.map_err(|e| {
            WayfarerError::CdpConnectionFailed(format!("Failed to create page: {}", e))
        })?;

        Ok(CdpDriver::new(page))
    }

    /// Shut down the browser and its event loop
    pub async fn close(mut self) {
        let _ = self.browser.close().await;
        self.handler_task.abort();
        abandon(self.child);
    }
}

/// Kill and reap a browser process we no longer want
fn abandon(mut child: Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// chromiumoxide-backed implementation of [`PageDriver`]
pub struct CdpDriver {
    page: Page,
}

impl CdpDriver {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    async fn dispatch_mouse(
        &self,
        event_type: DispatchMouseEventType,
        x: f64,
        y: f64,
        clicks: bool,
    ) -> Result<()> {
        let mut builder = DispatchMouseEventParams::builder()
            .r#type(event_type)
            .x(x)
            .y(y);

        if clicks {
            builder = builder.button(MouseButton::Left).click_count(1);
        }

        let params = builder
            .build()
            .map_err(|e| WayfarerError::Other(format!("Invalid mouse event: {}", e)))?;

        self.page
            .execute(params)
            .await
            .map_err(|e| WayfarerError::Other(format!("Mouse event failed: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl PageDriver for CdpDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| WayfarerError::NavigationFailed(format!("{}: {}", url, e)))?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script.to_string())
            .await
            .map_err(|e| WayfarerError::JavaScriptError(e.to_string()))?;

        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn current_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .map_err(|e| WayfarerError::Other(format!("Failed to query URL: {}", e)))?;

        Ok(url.unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn click_at(&self, x: f64, y: f64) -> Result<()> {
        // Move first so the browser updates its hit-test target; without
        // mouseMoved, CDP may not dispatch the click to the right element.
        self.dispatch_mouse(DispatchMouseEventType::MouseMoved, x, y, false)
            .await?;
        self.dispatch_mouse(DispatchMouseEventType::MousePressed, x, y, true)
            .await?;
        self.dispatch_mouse(DispatchMouseEventType::MouseReleased, x, y, true)
            .await?;
        Ok(())
    }

    async fn hover_at(&self, x: f64, y: f64) -> Result<()> {
        self.dispatch_mouse(DispatchMouseEventType::MouseMoved, x, y, false)
            .await
    }

    async fn wait_for_load(&self, timeout: Duration) -> Result<()> {
        let start = Instant::now();

        loop {
            let ready = self
                .evaluate("document.readyState")
                .await
                .ok()
                .and_then(|v| v.as_str().map(|s| s == "complete"))
                .unwrap_or(false);

            if ready {
                return Ok(());
            }

            if start.elapsed() > timeout {
                tracing::debug!("Load wait expired after {:?}, proceeding anyway", timeout);
                return Ok(());
            }

            sleep(Duration::from_millis(100)).await;
        }
    }

    async fn set_cookie(&self, name: &str, value: &str, url: &str) -> Result<()> {
        let cookie = CookieParam::builder()
            .name(name)
            .value(value)
            .url(url)
            .build()
            .map_err(|e| WayfarerError::Other(format!("Invalid cookie: {}", e)))?;

        self.page
            .set_cookies(vec![cookie])
            .await
            .map_err(|e| WayfarerError::Other(format!("Failed to set cookie: {}", e)))?;

        Ok(())
    }
}
