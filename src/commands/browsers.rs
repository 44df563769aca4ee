use colored::Colorize;

use crate::browser::detect_browsers;
use crate::error::Result;

/// List every Chromium-family browser found on this machine
pub fn run() -> Result<()> {
    let browsers = detect_browsers();

    if browsers.is_empty() {
        println!("{}", "No Chromium-family browser found.".red());
        println!("Install Chrome, Brave, Edge, or Chromium to use wayfarer.");
        return Ok(());
    }

    println!("{}", "Available browsers:".bold());
    for (i, browser) in browsers.iter().enumerate() {
        let marker = if i == 0 { "*".green() } else { " ".normal() };
        let version = browser.version.as_deref().unwrap_or("unknown version");
        println!(
            "  {} {} ({}) {}",
            marker,
            browser.kind.name().cyan(),
            version,
            browser.path.display().to_string().dimmed()
        );
    }
    println!("\n{}", "* used by default".dimmed());

    Ok(())
}
