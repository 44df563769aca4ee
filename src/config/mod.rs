use std::path::PathBuf;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WayfarerError};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Browser launch configuration
    #[serde(default)]
    pub browser: BrowserSettings,

    /// Exploration engine configuration
    #[serde(default)]
    pub explore: ExploreSettings,

    /// Decision oracle configuration
    #[serde(default)]
    pub oracle: OracleSettings,

    /// Cookies injected into the browser context before any page script runs
    #[serde(default)]
    pub cookies: Vec<CookieSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    /// Browser executable path (overrides auto-discovery)
    pub executable: Option<String>,

    /// Run in headless mode
    #[serde(default = "default_true")]
    pub headless: bool,

    /// CDP debugging port
    #[serde(default = "default_cdp_port")]
    pub cdp_port: u16,

    /// User data directory (supports ~ expansion)
    pub user_data_dir: Option<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            cdp_port: default_cdp_port(),
            user_data_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExploreSettings {
    /// Stop after this many successful navigations
    #[serde(default = "default_max_navigations")]
    pub max_navigations: u32,

    /// Absolute interaction budget for a run
    #[serde(default = "default_max_clicks")]
    pub max_clicks: u32,

    /// Consecutive non-progressing interactions before the forced-navigation
    /// escape hatch kicks in
    #[serde(default = "default_failure_cutoff")]
    pub failure_cutoff: u32,

    /// Structural regions never scanned for interactive elements
    #[serde(default = "default_excluded_regions")]
    pub excluded_regions: Vec<String>,

    /// Element kinds eligible for discovery
    #[serde(default = "default_element_kinds")]
    pub element_kinds: Vec<String>,

    /// Pause between interactions (ms)
    #[serde(default = "default_interaction_delay_ms")]
    pub interaction_delay_ms: u64,

    /// Bound on every navigation/load wait (ms); expiry means proceed anyway
    #[serde(default = "default_nav_timeout_ms")]
    pub nav_timeout_ms: u64,

    /// Extended wait before the second scan attempt on an empty page (ms)
    #[serde(default = "default_scan_retry_ms")]
    pub scan_retry_ms: u64,

    /// How many recent interaction signatures to remember
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

impl Default for ExploreSettings {
    fn default() -> Self {
        Self {
            max_navigations: default_max_navigations(),
            max_clicks: default_max_clicks(),
            failure_cutoff: default_failure_cutoff(),
            excluded_regions: default_excluded_regions(),
            element_kinds: default_element_kinds(),
            interaction_delay_ms: default_interaction_delay_ms(),
            nav_timeout_ms: default_nav_timeout_ms(),
            scan_retry_ms: default_scan_retry_ms(),
            history_size: default_history_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleSettings {
    /// Consult the decision oracle when selecting elements
    #[serde(default)]
    pub enabled: bool,

    /// OpenAI-compatible API base URL
    #[serde(default = "default_oracle_url")]
    pub base_url: String,

    /// API key
    pub api_key: Option<String>,

    /// Model name
    #[serde(default = "default_oracle_model")]
    pub model: String,

    /// Cap on candidate elements shown to the oracle per call
    #[serde(default = "default_oracle_max_elements")]
    pub max_elements: usize,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_oracle_url(),
            api_key: None,
            model: default_oracle_model(),
            max_elements: default_oracle_max_elements(),
        }
    }
}

/// A cookie injected before exploration starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieSpec {
    pub name: String,
    pub value: String,
    /// Scope URL; defaults to the start URL when omitted
    pub url: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_cdp_port() -> u16 {
    9223
}

fn default_max_navigations() -> u32 {
    10
}

fn default_max_clicks() -> u32 {
    50
}

fn default_failure_cutoff() -> u32 {
    3
}

fn default_excluded_regions() -> Vec<String> {
    vec![
        "header".to_string(),
        "footer".to_string(),
        "nav".to_string(),
        "[role=\"banner\"]".to_string(),
        "[role=\"contentinfo\"]".to_string(),
        "[role=\"navigation\"]".to_string(),
    ]
}

fn default_element_kinds() -> Vec<String> {
    vec![
        "link".to_string(),
        "button".to_string(),
        "input".to_string(),
        "generic".to_string(),
    ]
}

fn default_interaction_delay_ms() -> u64 {
    500
}

fn default_nav_timeout_ms() -> u64 {
    10_000
}

fn default_scan_retry_ms() -> u64 {
    3_000
}

fn default_history_size() -> usize {
    10
}

fn default_oracle_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_oracle_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_oracle_max_elements() -> usize {
    20
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser: BrowserSettings::default(),
            explore: ExploreSettings::default(),
            oracle: OracleSettings::default(),
            cookies: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from all sources (defaults, file, env)
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration merging a specific TOML file
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            // Environment variables (WAYFARER_EXPLORE__MAX_CLICKS etc.)
            .merge(Env::prefixed("WAYFARER_").split("__"))
            .extract()
            .map_err(|e| WayfarerError::ConfigError(e.to_string()))?;

        Ok(config)
    }

    /// Get the configuration file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wayfarer")
            .join("config.toml")
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| WayfarerError::ConfigError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolved user data directory for the launched browser
    pub fn user_data_dir(&self) -> PathBuf {
        match self.browser.user_data_dir {
            Some(ref dir) => PathBuf::from(shellexpand::tilde(dir).to_string()),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("wayfarer")
                .join("profile"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_budgets() {
        let config = Config::default();

        assert_eq!(config.explore.max_navigations, 10);
        assert_eq!(config.explore.max_clicks, 50);
        assert_eq!(config.explore.failure_cutoff, 3);
        assert!(config.explore.max_clicks >= config.explore.max_navigations);
    }

    #[test]
    fn default_excluded_regions_cover_global_chrome() {
        let config = Config::default();

        assert!(config.explore.excluded_regions.contains(&"header".to_string()));
        assert!(config.explore.excluded_regions.contains(&"footer".to_string()));
        assert!(config.explore.excluded_regions.contains(&"nav".to_string()));
    }

    #[test]
    fn oracle_is_disabled_by_default() {
        let config = Config::default();

        assert!(!config.oracle.enabled);
        assert!(config.oracle.api_key.is_none());
        assert_eq!(config.oracle.max_elements, 20);
    }

    #[test]
    fn load_from_merges_toml_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[explore]
max_navigations = 3
max_clicks = 12

[oracle]
enabled = true
model = "gpt-4o"
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.explore.max_navigations, 3);
        assert_eq!(config.explore.max_clicks, 12);
        assert!(config.oracle.enabled);
        assert_eq!(config.oracle.model, "gpt-4o");
        // Untouched sections keep defaults
        assert_eq!(config.explore.failure_cutoff, 3);
        assert_eq!(config.browser.cdp_port, 9223);
    }

    #[test]
    fn load_from_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.explore.max_clicks, 50);
        assert!(config.cookies.is_empty());
    }

    #[test]
    fn cookie_entries_parse_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[[cookies]]
name = "session"
value = "abc123"

[[cookies]]
name = "consent"
value = "yes"
url = "https://example.com"
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.cookies.len(), 2);
        assert_eq!(config.cookies[0].name, "session");
        assert!(config.cookies[0].url.is_none());
        assert_eq!(config.cookies[1].url.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn user_data_dir_expands_tilde() {
        let mut config = Config::default();
        config.browser.user_data_dir = Some("~/wayfarer-profile".to_string());

        let dir = config.user_data_dir();
        assert!(!dir.to_string_lossy().contains('~'));
        assert!(dir.ends_with("wayfarer-profile"));
    }
}
