use std::collections::HashSet;
use std::time::Duration;

use url::Url;

use crate::browser::PageDriver;
use crate::error::{Result, WayfarerError};

/// Strip the fragment and any trailing slash for comparison purposes.
/// Raw fragments are tracked separately for SPA-navigation detection.
pub fn normalize_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string().trim_end_matches('/').to_string()
        }
        Err(_) => raw
            .split('#')
            .next()
            .unwrap_or("")
            .trim_end_matches('/')
            .to_string(),
    }
}

/// The raw fragment of a URL, if it carries a non-empty one
pub fn fragment_of(raw: &str) -> Option<String> {
    match Url::parse(raw) {
        Ok(url) => url.fragment().filter(|f| !f.is_empty()).map(String::from),
        Err(_) => raw
            .split_once('#')
            .map(|(_, f)| f)
            .filter(|f| !f.is_empty())
            .map(String::from),
    }
}

/// Serialized origin (`scheme://host:port`) of a URL, if it parses
pub fn origin_of(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    match url.origin() {
        url::Origin::Opaque(_) => None,
        origin => Some(origin.ascii_serialization()),
    }
}

pub fn same_origin(a: &str, b: &str) -> bool {
    match (origin_of(a), origin_of(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Path plus query string, for "does this link actually go somewhere else"
/// checks that must ignore the fragment
pub fn path_and_query(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let mut out = url.path().to_string();
    if let Some(query) = url.query() {
        out.push('?');
        out.push_str(query);
    }
    Some(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    NewPage,
    Revisit,
}

/// Tracks which normalized URLs and fragment-only virtual states the
/// orchestrator has already counted as distinct pages. The set only grows.
#[derive(Debug)]
pub struct UrlTracker {
    base_origin: String,
    initial_url: String,
    first_url: Option<String>,
    visited: HashSet<String>,
}

impl UrlTracker {
    pub fn new(start_url: &str) -> Result<Self> {
        let base_origin = origin_of(start_url).ok_or_else(|| {
            WayfarerError::ConfigError(format!("Invalid start URL: {}", start_url))
        })?;

        Ok(Self {
            base_origin,
            initial_url: start_url.to_string(),
            first_url: None,
            visited: HashSet::new(),
        })
    }

    /// Count a full URL visit. The first page ever recorded is remembered
    /// for the "home-like" selection guardrail.
    pub fn record_visit(&mut self, url: &str) -> Visit {
        let normalized = normalize_url(url);
        if self.first_url.is_none() {
            self.first_url = Some(normalized.clone());
        }
        if self.visited.insert(normalized) {
            Visit::NewPage
        } else {
            Visit::Revisit
        }
    }

    /// Count a fragment-only virtual state under its composite key.
    /// Returns true when the state is new.
    pub fn record_virtual(&mut self, url: &str, fragment: &str) -> bool {
        self.visited
            .insert(format!("{}#{}", normalize_url(url), fragment))
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.visited.contains(&normalize_url(url))
    }

    pub fn visited(&self) -> &HashSet<String> {
        &self.visited
    }

    pub fn first_url(&self) -> Option<&str> {
        self.first_url.as_deref()
    }

    pub fn initial_url(&self) -> &str {
        &self.initial_url
    }

    pub fn base_origin(&self) -> &str {
        &self.base_origin
    }

    pub fn in_origin(&self, url: &str) -> bool {
        origin_of(url).as_deref() == Some(self.base_origin.as_str())
    }
}

/// Verify the page is still within the target origin; if not, force it
/// back to the initial URL. Violations are logged, never fatal.
/// Returns true when a deviation was detected.
pub async fn ensure_same_origin(driver: &dyn PageDriver, tracker: &UrlTracker) -> bool {
    let current = match driver.current_url().await {
        Ok(url) => url,
        Err(e) => {
            tracing::debug!("Could not query URL for origin check: {}", e);
            return false;
        }
    };

    if tracker.in_origin(&current) {
        return false;
    }

    tracing::warn!(
        "Navigated off-origin to {}, returning to {}",
        current,
        tracker.initial_url()
    );

    if let Err(e) = driver.navigate(tracker.initial_url()).await {
        tracing::warn!("Failed to return to start URL: {}", e);
    }

    true
}

const COLLECT_ANCHORS_JS: &str = r#"
(function() {
    const out = [];
    for (const a of document.querySelectorAll('a[href]')) {
        const href = a.href;
        if (!href || !href.startsWith(location.origin)) continue;
        let u;
        try { u = new URL(href); } catch (e) { continue; }
        if (u.pathname === location.pathname && u.search === location.search && u.hash) continue;
        out.push(href);
    }
    return out;
})()
"#;

const CLICK_ANCHOR_JS: &str = r#"
(function(target) {
    for (const a of document.querySelectorAll('a[href]')) {
        if (a.href === target) {
            a.scrollIntoView({ behavior: 'instant', block: 'center' });
            a.click();
            return true;
        }
    }
    return false;
})(__TARGET__)
"#;

/// Escape hatch for repeated non-progress: click the first same-origin,
/// non-fragment anchor whose normalized target has not been visited yet.
/// Deliberately unscored; the point is to make any progress at all.
/// Returns the new URL on success.
pub async fn force_new_page(
    driver: &dyn PageDriver,
    tracker: &UrlTracker,
    nav_timeout: Duration,
) -> Option<String> {
    let anchors = match driver.evaluate(COLLECT_ANCHORS_JS).await {
        Ok(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect::<Vec<_>>(),
        Ok(_) => Vec::new(),
        Err(e) => {
            tracing::debug!("Anchor collection failed: {}", e);
            Vec::new()
        }
    };

    let before = driver.current_url().await.ok()?;

    let mut attempts = 0;
    for href in anchors {
        if tracker.is_visited(&href) {
            continue;
        }
        if attempts >= 3 {
            break;
        }
        attempts += 1;

        tracing::info!("Forcing navigation to unvisited page: {}", href);

        let target = serde_json::to_string(&href).unwrap_or_default();
        let script = CLICK_ANCHOR_JS.replace("__TARGET__", &target);
        let clicked = driver
            .evaluate(&script)
            .await
            .ok()
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        if !clicked {
            // Anchor disappeared between collection and click; navigate directly
            if driver.navigate(&href).await.is_err() {
                continue;
            }
        }

        let _ = driver.wait_for_load(nav_timeout).await;

        if let Ok(after) = driver.current_url().await {
            if normalize_url(&after) != normalize_url(&before) {
                return Some(after);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_fragment() {
        assert_eq!(
            normalize_url("https://example.com/page#section"),
            normalize_url("https://example.com/page")
        );
    }

    #[test]
    fn normalize_strips_trailing_slash() {
        assert_eq!(
            normalize_url("https://example.com/page/"),
            normalize_url("https://example.com/page")
        );
        assert_eq!(normalize_url("https://example.com/"), "https://example.com");
    }

    #[test]
    fn normalize_keeps_query() {
        assert_eq!(
            normalize_url("https://example.com/search?q=1"),
            "https://example.com/search?q=1"
        );
    }

    #[test]
    fn fragment_of_extracts_raw_fragment() {
        assert_eq!(
            fragment_of("https://example.com/app#/settings"),
            Some("/settings".to_string())
        );
        assert_eq!(fragment_of("https://example.com/app"), None);
        assert_eq!(fragment_of("https://example.com/app#"), None);
    }

    #[test]
    fn origin_comparison() {
        assert!(same_origin(
            "https://example.com/a",
            "https://example.com/b?x=1"
        ));
        assert!(!same_origin("https://example.com", "https://other.com"));
        assert!(!same_origin("https://example.com", "http://example.com"));
        assert!(!same_origin("not a url", "https://example.com"));
    }

    #[test]
    fn path_and_query_ignores_fragment() {
        assert_eq!(
            path_and_query("https://example.com/a/b?x=1#frag"),
            Some("/a/b?x=1".to_string())
        );
    }

    #[test]
    fn tracker_counts_new_pages_and_revisits() {
        let mut tracker = UrlTracker::new("https://example.com").unwrap();

        assert_eq!(tracker.record_visit("https://example.com/"), Visit::NewPage);
        assert_eq!(tracker.record_visit("https://example.com"), Visit::Revisit);
        assert_eq!(
            tracker.record_visit("https://example.com/about"),
            Visit::NewPage
        );
        // Fragment variants collapse onto the visited page
        assert!(tracker.is_visited("https://example.com/about#team"));
    }

    #[test]
    fn tracker_virtual_states_are_distinct_from_pages() {
        let mut tracker = UrlTracker::new("https://example.com").unwrap();
        tracker.record_visit("https://example.com/app");

        assert!(tracker.record_virtual("https://example.com/app", "/settings"));
        assert!(!tracker.record_virtual("https://example.com/app", "/settings"));
        // The bare page stays visited independently
        assert!(tracker.is_visited("https://example.com/app"));
    }

    #[test]
    fn tracker_remembers_first_url() {
        let mut tracker = UrlTracker::new("https://example.com/start").unwrap();
        assert!(tracker.first_url().is_none());

        tracker.record_visit("https://example.com/start/");
        tracker.record_visit("https://example.com/other");

        assert_eq!(tracker.first_url(), Some("https://example.com/start"));
    }

    #[test]
    fn tracker_origin_check() {
        let tracker = UrlTracker::new("https://example.com/start").unwrap();
        assert!(tracker.in_origin("https://example.com/anywhere"));
        assert!(!tracker.in_origin("https://evil.com/"));
        assert!(!tracker.in_origin("not a url"));
    }

    #[test]
    fn invalid_start_url_is_rejected() {
        assert!(UrlTracker::new("not a url").is_err());
    }

    #[test]
    fn visited_set_only_grows() {
        let mut tracker = UrlTracker::new("https://example.com").unwrap();
        tracker.record_visit("https://example.com/a");
        let before = tracker.visited().len();
        tracker.record_visit("https://example.com/a");
        tracker.record_visit("https://example.com/a#x");
        assert_eq!(tracker.visited().len(), before);
    }
}
