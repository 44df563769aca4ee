use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tokio::time::sleep;

use super::detect::{detect_browser, BrowserInfo, BrowserKind};
use crate::config::Config;
use crate::error::{Result, WayfarerError};

/// Starts a Chromium-family browser with CDP enabled and waits for the
/// debugging endpoint to come up.
pub struct BrowserLauncher {
    browser_info: BrowserInfo,
    cdp_port: u16,
    headless: bool,
    user_data_dir: PathBuf,
}

impl BrowserLauncher {
    /// Build a launcher from configuration, auto-discovering the browser
    /// when no executable is pinned.
    pub fn from_config(config: &Config) -> Result<Self> {
        let browser_info = match config.browser.executable {
            Some(ref path) => {
                let path = PathBuf::from(shellexpand::tilde(path).to_string());
                if !path.exists() {
                    return Err(WayfarerError::BrowserLaunchFailed(format!(
                        "Browser not found at: {}",
                        path.display()
                    )));
                }
                BrowserInfo::new(BrowserKind::Chrome, path)
            }
            None => detect_browser()?,
        };

        Ok(Self {
            browser_info,
            cdp_port: config.browser.cdp_port,
            headless: config.browser.headless,
            user_data_dir: config.user_data_dir(),
        })
    }

    fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--remote-debugging-port={}", self.cdp_port),
            format!("--user-data-dir={}", self.user_data_dir.display()),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--disable-infobars".to_string(),
            "--disable-save-password-bubble".to_string(),
            "--disable-translate".to_string(),
            "--window-size=1920,1080".to_string(),
        ];

        if self.headless {
            args.push("--headless=new".to_string());
        }

        args
    }

    /// Spawn the browser process
    pub fn launch(&self) -> Result<Child> {
        std::fs::create_dir_all(&self.user_data_dir)?;

        let args = self.build_args();

        tracing::debug!(
            "Launching browser: {:?} with args: {:?}",
            self.browser_info.path,
            args
        );

        let child = Command::new(&self.browser_info.path)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                WayfarerError::BrowserLaunchFailed(format!(
                    "Failed to launch {}: {}",
                    self.browser_info.kind.name(),
                    e
                ))
            })?;

        Ok(child)
    }

    /// Launch the browser and wait for CDP to be ready, returning the
    /// process handle and the browser WebSocket URL.
    pub async fn launch_and_wait(&self) -> Result<(Child, String)> {
        let child = self.launch()?;
        let cdp_url = self.wait_for_cdp().await?;
        Ok((child, cdp_url))
    }

    /// Poll `/json/version` until the debugging endpoint answers
    async fn wait_for_cdp(&self) -> Result<String> {
        let url = format!("http://127.0.0.1:{}/json/version", self.cdp_port);

        // Bypass proxies for localhost
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        for i in 0..20 {
            sleep(Duration::from_millis(500)).await;

            match client.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    let json: serde_json::Value = response.json().await.map_err(|e| {
                        WayfarerError::CdpConnectionFailed(format!(
                            "Failed to parse CDP response: {}",
                            e
                        ))
                    })?;

                    if let Some(ws_url) = json.get("webSocketDebuggerUrl").and_then(|v| v.as_str())
                    {
                        tracing::info!("CDP ready at: {}", ws_url);
                        return Ok(ws_url.to_string());
                    }
                }
                Ok(_) => {
                    tracing::debug!("CDP not ready yet (attempt {})", i + 1);
                }
                Err(e) => {
                    tracing::debug!("CDP connection attempt {} failed: {}", i + 1, e);
                }
            }
        }

        Err(WayfarerError::Timeout(
            "CDP debugging endpoint did not come up".to_string(),
        ))
    }

    pub fn browser_info(&self) -> &BrowserInfo {
        &self.browser_info
    }

    pub fn cdp_port(&self) -> u16 {
        self.cdp_port
    }
}
