mod detect;
mod driver;
mod launcher;

pub use detect::{detect_browser, detect_browsers, BrowserInfo, BrowserKind};
pub use driver::{BrowserHandle, CdpDriver, PageDriver};
pub use launcher::BrowserLauncher;
