use colored::Colorize;

use crate::config::Config;
use crate::error::{Result, WayfarerError};

/// Print the effective configuration after merging all sources
pub fn show() -> Result<()> {
    let config = Config::load()?;
    let rendered =
        toml::to_string_pretty(&config).map_err(|e| WayfarerError::ConfigError(e.to_string()))?;

    println!("{}", "Effective configuration:".bold());
    println!("{}", rendered);
    Ok(())
}

pub fn path() -> Result<()> {
    println!("{}", Config::config_path().display());
    Ok(())
}

/// Write a default configuration file, refusing to clobber an existing one
pub fn init() -> Result<()> {
    let path = Config::config_path();

    if path.exists() {
        println!(
            "{} {}",
            "Configuration already exists at".yellow(),
            path.display()
        );
        return Ok(());
    }

    Config::default().save()?;
    println!("{} {}", "Wrote default configuration to".green(), path.display());
    Ok(())
}
