use std::path::PathBuf;
use std::process::Command;

use crate::error::{Result, WayfarerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserKind {
    Chrome,
    Brave,
    Edge,
    Chromium,
}

impl BrowserKind {
    pub fn name(&self) -> &'static str {
        match self {
            BrowserKind::Chrome => "Google Chrome",
            BrowserKind::Brave => "Brave",
            BrowserKind::Edge => "Microsoft Edge",
            BrowserKind::Chromium => "Chromium",
        }
    }

    /// Executable names to try on PATH when no well-known location matches
    fn path_names(&self) -> &'static [&'static str] {
        match self {
            BrowserKind::Chrome => &["google-chrome", "google-chrome-stable", "chrome"],
            BrowserKind::Brave => &["brave-browser", "brave"],
            BrowserKind::Edge => &["microsoft-edge", "msedge"],
            BrowserKind::Chromium => &["chromium", "chromium-browser"],
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserInfo {
    pub kind: BrowserKind,
    pub path: PathBuf,
    pub version: Option<String>,
}

impl BrowserInfo {
    pub fn new(kind: BrowserKind, path: PathBuf) -> Self {
        Self {
            kind,
            path,
            version: None,
        }
    }

    pub fn with_version(mut self) -> Self {
        self.version = detect_version(&self.path);
        self
    }
}

/// Find the best available Chromium-family browser on the system
pub fn detect_browser() -> Result<BrowserInfo> {
    detect_browsers()
        .into_iter()
        .next()
        .ok_or(WayfarerError::BrowserNotFound)
}

/// Find all available Chromium-family browsers, highest priority first
pub fn detect_browsers() -> Vec<BrowserInfo> {
    let mut found = Vec::new();

    for (kind, candidates) in known_locations() {
        let located = candidates
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
            .or_else(|| {
                kind.path_names()
                    .iter()
                    .find_map(|name| which::which(name).ok())
            });

        if let Some(path) = located {
            found.push(BrowserInfo::new(kind, path).with_version());
        }
    }

    found
}

fn known_locations() -> Vec<(BrowserKind, Vec<&'static str>)> {
    #[cfg(target_os = "macos")]
    {
        vec![
            (
                BrowserKind::Chrome,
                vec!["/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"],
            ),
            (
                BrowserKind::Brave,
                vec!["/Applications/Brave Browser.app/Contents/MacOS/Brave Browser"],
            ),
            (
                BrowserKind::Edge,
                vec!["/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge"],
            ),
            (
                BrowserKind::Chromium,
                vec!["/Applications/Chromium.app/Contents/MacOS/Chromium"],
            ),
        ]
    }

    #[cfg(target_os = "linux")]
    {
        vec![
            (
                BrowserKind::Chrome,
                vec!["/usr/bin/google-chrome", "/usr/bin/google-chrome-stable"],
            ),
            (
                BrowserKind::Brave,
                vec!["/usr/bin/brave-browser", "/usr/bin/brave"],
            ),
            (
                BrowserKind::Edge,
                vec!["/usr/bin/microsoft-edge", "/usr/bin/microsoft-edge-stable"],
            ),
            (
                BrowserKind::Chromium,
                vec![
                    "/usr/bin/chromium",
                    "/usr/bin/chromium-browser",
                    "/snap/bin/chromium",
                ],
            ),
        ]
    }

    #[cfg(target_os = "windows")]
    {
        vec![
            (
                BrowserKind::Chrome,
                vec![
                    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
                    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
                ],
            ),
            (
                BrowserKind::Brave,
                vec![
                    r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
                ],
            ),
            (
                BrowserKind::Edge,
                vec![
                    r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
                    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
                ],
            ),
        ]
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        vec![]
    }
}

/// Run `<browser> --version` and extract the trailing version number
fn detect_version(path: &PathBuf) -> Option<String> {
    let output = Command::new(path).arg("--version").output().ok()?;

    if !output.status.success() {
        return None;
    }

    let version = String::from_utf8_lossy(&output.stdout);
    let version = version.trim();
    match version.rfind(' ') {
        Some(idx) => Some(version[idx + 1..].to_string()),
        None => Some(version.to_string()),
    }
}
