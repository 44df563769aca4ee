use std::time::Duration;

use crate::browser::PageDriver;
use crate::config::ExploreSettings;

use super::element::{ElementKind, InteractiveElement};
use super::plan::ActionKind;
use super::urls::{fragment_of, normalize_url, path_and_query, same_origin};

/// What a single interaction attempt did to the page. Produced for every
/// attempt; execution failures surface as a no-op outcome, never an error.
#[derive(Debug, Clone)]
pub struct InteractionOutcome {
    pub action: ActionKind,
    pub url_before: String,
    pub url_after: String,
    /// The normalized URL changed
    pub navigated: bool,
    /// Only the raw fragment changed (single-page-app route switch)
    pub fragment_only: bool,
    /// The value written, for fill actions
    pub value: Option<String>,
}

/// Shared resolver injected into every element-targeting script. Walks the
/// recorded shadow-host path before applying the selector.
const RESOLVE_FN_JS: &str = r#"
function resolve(path, selector) {
    let root = document;
    for (const hostSel of path) {
        const host = root.querySelector(hostSel);
        if (!host || !host.shadowRoot) return null;
        root = host.shadowRoot;
    }
    try { return root.querySelector(selector); } catch (e) { return null; }
}
"#;

/// Scroll the target into view and report its viewport center, plus whether
/// another element is sitting on top of that point.
const LOCATE_JS: &str = r#"
(function() {
    __RESOLVE__
    const el = resolve(__PATH__, __SELECTOR__);
    if (!el) return null;
    el.scrollIntoView({ behavior: 'instant', block: 'center' });
    const rect = el.getBoundingClientRect();
    if (rect.width <= 0 || rect.height <= 0) return null;
    const x = rect.x + rect.width / 2;
    const y = rect.y + rect.height / 2;
    const hit = document.elementFromPoint(x, y);
    const obstructed = hit !== null && hit !== el && !el.contains(hit) && !hit.contains(el);
    return { x: x, y: y, obstructed: obstructed };
})()
"#;

/// Hide (never remove) fixed or sticky overlays that cover a large share of
/// the viewport, and anything that looks like a cookie-consent banner.
/// Hiding keeps page scripts that hold references to these nodes working.
const HIDE_OVERLAYS_JS: &str = r#"
(function() {
    let hidden = 0;
    const vw = window.innerWidth, vh = window.innerHeight;
    for (const el of document.querySelectorAll('body *')) {
        const style = window.getComputedStyle(el);
        if (style.position !== 'fixed' && style.position !== 'sticky') continue;
        if (style.visibility === 'hidden' || style.display === 'none') continue;
        const rect = el.getBoundingClientRect();
        const coversViewport = rect.width >= vw * 0.5 && rect.height >= vh * 0.3;
        const id = ((el.id || '') + ' ' + (el.className || '')).toLowerCase();
        const looksLikeBanner = /cookie|consent|gdpr|overlay|modal-backdrop/.test(id);
        if (coversViewport || looksLikeBanner) {
            el.style.visibility = 'hidden';
            hidden++;
        }
    }
    return hidden;
})()
"#;

const FORCE_CLICK_JS: &str = r#"
(function() {
    __RESOLVE__
    const el = resolve(__PATH__, __SELECTOR__);
    if (!el) return false;
    el.click();
    return true;
})()
"#;

/// Re-locate by recorded href, accessible name, or exact text when the
/// structural selector no longer matches anything. Pages re-render between
/// scan and act.
const CLICK_BY_ATTRS_JS: &str = r#"
(function() {
    const href = __HREF__;
    const name = __NAME__;
    const text = __TEXT__;
    if (href) {
        for (const a of document.querySelectorAll('a[href]')) {
            if (a.href === href) {
                a.scrollIntoView({ behavior: 'instant', block: 'center' });
                a.click();
                return true;
            }
        }
    }
    if (name) {
        for (const el of document.querySelectorAll('[aria-label]')) {
            if ((el.getAttribute('aria-label') || '').trim() === name) {
                el.scrollIntoView({ behavior: 'instant', block: 'center' });
                el.click();
                return true;
            }
        }
    }
    if (text) {
        for (const el of document.querySelectorAll('a, button, [role="button"]')) {
            if ((el.innerText || '').trim() === text) {
                el.scrollIntoView({ behavior: 'instant', block: 'center' });
                el.click();
                return true;
            }
        }
    }
    return false;
})()
"#;

/// Bring the target into view, or page down when it cannot be resolved.
const SCROLL_JS: &str = r#"
(function() {
    __RESOLVE__
    const el = resolve(__PATH__, __SELECTOR__);
    if (el) {
        el.scrollIntoView({ behavior: 'instant', block: 'center' });
        return true;
    }
    window.scrollBy(0, window.innerHeight);
    return true;
})()
"#;

/// Try each locator in order; write the value with synthetic input/change
/// events so framework bindings observe it.
const FILL_JS: &str = r#"
(function() {
    __RESOLVE__
    const path = __PATH__;
    let el = null;
    for (const selector of __SELECTORS__) {
        el = resolve(path, selector);
        if (el) break;
    }
    if (!el) return null;
    el.scrollIntoView({ behavior: 'instant', block: 'center' });
    el.focus();
    const type = (el.getAttribute('type') || 'text').toLowerCase();
    const defaults = {
        email: 'test@example.com',
        password: 'Password123!',
        tel: '555-0100',
        number: '42',
        url: 'https://example.com',
        date: '2024-01-15',
        search: 'test query'
    };
    const value = __VALUE__ !== null ? __VALUE__ : (defaults[type] || 'test input');
    el.value = value;
    el.dispatchEvent(new Event('input', { bubbles: true, composed: true }));
    el.dispatchEvent(new Event('change', { bubbles: true, composed: true }));
    return value;
})()
"#;

/// Close anything modal the interaction may have opened, so the next scan
/// sees the page underneath.
const CLOSE_DIALOGS_JS: &str = r#"
(function() {
    let closed = 0;
    for (const dialog of document.querySelectorAll('dialog[open]')) {
        dialog.close();
        closed++;
    }
    for (const modal of document.querySelectorAll('[role="dialog"], [aria-modal="true"]')) {
        const btn = modal.querySelector(
            '[aria-label*="close" i], [aria-label*="dismiss" i], button.close, .modal-close');
        if (btn) { btn.click(); closed++; }
    }
    return closed;
})()
"#;

fn json_or_null(value: Option<&str>) -> String {
    value
        .filter(|v| !v.is_empty())
        .and_then(|v| serde_json::to_string(v).ok())
        .unwrap_or_else(|| "null".to_string())
}

fn click_by_attrs_script(element: &InteractiveElement) -> String {
    CLICK_BY_ATTRS_JS
        .replace("__HREF__", &json_or_null(element.href.as_deref()))
        .replace("__NAME__", &json_or_null(element.accessible_name.as_deref()))
        .replace("__TEXT__", &json_or_null(Some(element.text.as_str())))
}

fn with_target(template: &str, element: &InteractiveElement, selector: &str) -> String {
    let path = serde_json::to_string(
        element.shadow_path.as_deref().unwrap_or(&[]),
    )
    .unwrap_or_else(|_| "[]".to_string());
    let selector = serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string());

    template
        .replace("__RESOLVE__", RESOLVE_FN_JS)
        .replace("__PATH__", &path)
        .replace("__SELECTOR__", &selector)
}

#[derive(Debug, Clone, Copy)]
struct Located {
    x: f64,
    y: f64,
    obstructed: bool,
}

/// Executes one interaction per orchestrator iteration. Each action kind
/// carries an ordered fallback chain; the first strategy that takes effect
/// wins, and total failure is reported in the outcome rather than raised.
pub struct InteractionExecutor<'a> {
    driver: &'a dyn PageDriver,
    settings: &'a ExploreSettings,
}

impl<'a> InteractionExecutor<'a> {
    pub fn new(driver: &'a dyn PageDriver, settings: &'a ExploreSettings) -> Self {
        Self { driver, settings }
    }

    pub async fn interact(
        &self,
        element: &InteractiveElement,
        action_hint: Option<&str>,
        value_hint: Option<&str>,
    ) -> InteractionOutcome {
        let url_before = self.driver.current_url().await.unwrap_or_default();

        let (action, value) = match (element.kind, action_hint) {
            (ElementKind::Input, _) | (_, Some("fill")) => {
                let value = self.fill(element, value_hint).await;
                (ActionKind::Fill, value)
            }
            (_, Some("hover")) => {
                self.hover(element).await;
                (ActionKind::Hover, None)
            }
            (_, Some("scroll")) => {
                self.scroll(element).await;
                (ActionKind::Scroll, None)
            }
            _ => {
                self.click(element).await;
                (ActionKind::Click, None)
            }
        };

        tokio::time::sleep(Duration::from_millis(self.settings.interaction_delay_ms)).await;
        let _ = self
            .driver
            .wait_for_load(Duration::from_millis(self.settings.nav_timeout_ms))
            .await;

        if let Ok(serde_json::Value::Number(n)) = self.driver.evaluate(CLOSE_DIALOGS_JS).await {
            if n.as_u64().unwrap_or(0) > 0 {
                tracing::debug!("Closed {} residual dialog(s)", n);
            }
        }

        let mut url_after = self
            .driver
            .current_url()
            .await
            .unwrap_or_else(|_| url_before.clone());

        let mut navigated = normalize_url(&url_before) != normalize_url(&url_after);
        let mut fragment_only = !navigated && fragment_of(&url_before) != fragment_of(&url_after);

        // Last resort for links whose click was swallowed by page scripts,
        // or that no click strategy could reach: when the target is
        // same-origin and actually points at a different path, go there
        // directly before declaring no-navigation.
        if action == ActionKind::Click && !navigated && !fragment_only {
            if let Some(ref href) = element.href {
                if same_origin(href, &url_before)
                    && path_and_query(href) != path_and_query(&url_before)
                {
                    tracing::debug!("No navigation after click, going to {} directly", href);
                    if self.driver.navigate(href).await.is_ok() {
                        let _ = self
                            .driver
                            .wait_for_load(Duration::from_millis(self.settings.nav_timeout_ms))
                            .await;
                        if let Ok(after) = self.driver.current_url().await {
                            url_after = after;
                        }
                        navigated = normalize_url(&url_before) != normalize_url(&url_after);
                        fragment_only =
                            !navigated && fragment_of(&url_before) != fragment_of(&url_after);
                    }
                }
            }
        }

        InteractionOutcome {
            action,
            url_before,
            url_after,
            navigated,
            fragment_only,
            value,
        }
    }

    async fn locate(&self, element: &InteractiveElement) -> Option<Located> {
        let script = with_target(LOCATE_JS, element, &element.selector);
        let value = self.driver.evaluate(&script).await.ok()?;
        let obj = value.as_object()?;
        Some(Located {
            x: obj.get("x")?.as_f64()?,
            y: obj.get("y")?.as_f64()?,
            obstructed: obj.get("obstructed")?.as_bool().unwrap_or(false),
        })
    }

    /// Click chain: real mouse events at the element's center, with one
    /// overlay-hiding pass when something sits on top; then a direct DOM
    /// click; then relocation by href, accessible name, or text.
    async fn click(&self, element: &InteractiveElement) {
        let mut located = self.locate(element).await;

        if located.is_some_and(|l| l.obstructed) {
            tracing::debug!("Target \"{}\" is covered, hiding overlays", element.text);
            let _ = self.driver.evaluate(HIDE_OVERLAYS_JS).await;
            located = self.locate(element).await;
        }

        if let Some(l) = located {
            if !l.obstructed {
                match self.driver.click_at(l.x, l.y).await {
                    Ok(()) => return,
                    Err(e) => tracing::debug!("Mouse click failed: {}", e),
                }
            }
        }

        let script = with_target(FORCE_CLICK_JS, element, &element.selector);
        if self.eval_bool(&script).await {
            return;
        }

        let script = click_by_attrs_script(element);
        if !self.eval_bool(&script).await {
            tracing::debug!("Every click strategy failed for \"{}\"", element.selector);
        }
    }

    async fn eval_bool(&self, script: &str) -> bool {
        self.driver
            .evaluate(script)
            .await
            .ok()
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    async fn hover(&self, element: &InteractiveElement) {
        if let Some(l) = self.locate(element).await {
            if let Err(e) = self.driver.hover_at(l.x, l.y).await {
                tracing::debug!("Hover failed: {}", e);
            }
        }
    }

    /// Scroll the target into view, or one viewport down when the element
    /// cannot be resolved anymore.
    async fn scroll(&self, element: &InteractiveElement) {
        let script = with_target(SCROLL_JS, element, &element.selector);
        if !self.eval_bool(&script).await {
            tracing::debug!("Scroll failed for \"{}\"", element.selector);
        }
    }

    /// Fill chain: id locator, then the recorded selector, then the
    /// accessible name as a placeholder match. The script falls back to a
    /// per-type default when no value was suggested.
    async fn fill(&self, element: &InteractiveElement, value_hint: Option<&str>) -> Option<String> {
        let mut locators = Vec::new();
        if let Some(ref id) = element.stable_id {
            locators.push(format!("[id={}]", serde_json::to_string(id).ok()?));
        }
        locators.push(element.selector.clone());
        if let Some(ref name) = element.accessible_name {
            locators.push(format!(
                "[placeholder={}]",
                serde_json::to_string(name).ok()?
            ));
        }

        let selectors = serde_json::to_string(&locators).ok()?;
        let value = match value_hint {
            Some(v) => serde_json::to_string(v).ok()?,
            None => "null".to_string(),
        };

        let script = with_target(FILL_JS, element, &element.selector)
            .replace("__SELECTORS__", &selectors)
            .replace("__VALUE__", &value);

        match self.driver.evaluate(&script).await {
            Ok(serde_json::Value::String(written)) => Some(written),
            Ok(_) => {
                tracing::debug!("No fillable element found for \"{}\"", element.selector);
                None
            }
            Err(e) => {
                tracing::debug!("Fill failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, WayfarerError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Driver fake scripted per call site: evaluate answers are matched by a
    /// marker substring of the script, URLs are served in order.
    struct FakeDriver {
        urls: Mutex<Vec<String>>,
        evaluate_rules: Vec<(&'static str, serde_json::Value)>,
        calls: Mutex<Vec<String>>,
        fail_mouse: bool,
    }

    impl FakeDriver {
        fn new(urls: &[&str]) -> Self {
            Self {
                urls: Mutex::new(urls.iter().rev().map(|s| s.to_string()).collect()),
                evaluate_rules: Vec::new(),
                calls: Mutex::new(Vec::new()),
                fail_mouse: false,
            }
        }

        fn on(mut self, marker: &'static str, value: serde_json::Value) -> Self {
            self.evaluate_rules.push((marker, value));
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageDriver for FakeDriver {
        async fn navigate(&self, url: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("navigate:{}", url));
            Ok(())
        }

        async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
            for (marker, value) in &self.evaluate_rules {
                if script.contains(marker) {
                    self.calls.lock().unwrap().push(format!("eval:{}", marker));
                    return Ok(value.clone());
                }
            }
            Ok(serde_json::Value::Null)
        }

        async fn current_url(&self) -> Result<String> {
            let mut urls = self.urls.lock().unwrap();
            if urls.len() > 1 {
                Ok(urls.pop().unwrap())
            } else {
                urls.last()
                    .cloned()
                    .ok_or_else(|| WayfarerError::Other("no url".to_string()))
            }
        }

        async fn click_at(&self, x: f64, y: f64) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("click_at:{},{}", x, y));
            if self.fail_mouse {
                Err(WayfarerError::JavaScriptError("mouse failed".to_string()))
            } else {
                Ok(())
            }
        }

        async fn hover_at(&self, x: f64, y: f64) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("hover_at:{},{}", x, y));
            Ok(())
        }

        async fn wait_for_load(&self, _timeout: Duration) -> Result<()> {
            Ok(())
        }

        async fn set_cookie(&self, _name: &str, _value: &str, _url: &str) -> Result<()> {
            Ok(())
        }
    }

    fn settings() -> ExploreSettings {
        ExploreSettings {
            interaction_delay_ms: 0,
            nav_timeout_ms: 10,
            ..Default::default()
        }
    }

    fn button(selector: &str) -> InteractiveElement {
        InteractiveElement {
            kind: ElementKind::Button,
            text: "Go".to_string(),
            selector: selector.to_string(),
            accessible_name: None,
            href: None,
            stable_id: None,
            shadow_path: None,
            rect: Default::default(),
            visible: true,
        }
    }

    #[tokio::test]
    async fn click_uses_mouse_at_located_center() {
        let driver = FakeDriver::new(&["https://a.com", "https://a.com/next"]).on(
            "elementFromPoint",
            serde_json::json!({ "x": 40.0, "y": 60.0, "obstructed": false }),
        );
        let settings = settings();

        let outcome = InteractionExecutor::new(&driver, &settings)
            .interact(&button("#go"), None, None)
            .await;

        assert!(driver.calls().contains(&"click_at:40,60".to_string()));
        assert!(outcome.navigated);
        assert!(!outcome.fragment_only);
        assert_eq!(outcome.url_after, "https://a.com/next");
    }

    #[tokio::test]
    async fn obstructed_click_hides_overlays_and_retries() {
        let driver = FakeDriver::new(&["https://a.com"])
            .on(
                "elementFromPoint",
                serde_json::json!({ "x": 10.0, "y": 10.0, "obstructed": true }),
            )
            .on("coversViewport", serde_json::json!(2))
            .on("el.click()", serde_json::json!(true));
        let settings = settings();

        InteractionExecutor::new(&driver, &settings)
            .interact(&button("#go"), None, None)
            .await;

        let calls = driver.calls();
        // Overlay pass ran, and the still-obstructed target fell back to a
        // forced DOM click instead of a blind mouse press
        assert!(calls.contains(&"eval:coversViewport".to_string()));
        assert!(calls.contains(&"eval:el.click()".to_string()));
        assert!(!calls.iter().any(|c| c.starts_with("click_at:")));
    }

    #[tokio::test]
    async fn failed_link_click_navigates_directly() {
        let mut driver = FakeDriver::new(&["https://a.com/"])
            .on("el.click()", serde_json::json!(false));
        driver.fail_mouse = true;
        let settings = settings();

        let mut link = button("a.docs");
        link.kind = ElementKind::Link;
        link.href = Some("https://a.com/docs".to_string());

        InteractionExecutor::new(&driver, &settings)
            .interact(&link, None, None)
            .await;

        assert!(driver
            .calls()
            .contains(&"navigate:https://a.com/docs".to_string()));
    }

    #[tokio::test]
    async fn swallowed_link_click_falls_back_to_direct_navigation() {
        // The mouse click lands but page scripts eat it; the URL never
        // changes, so the link's destination must still be reached
        let driver = FakeDriver::new(&["https://a.com/"]).on(
            "elementFromPoint",
            serde_json::json!({ "x": 4.0, "y": 4.0, "obstructed": false }),
        );
        let settings = settings();

        let mut link = button("a.docs");
        link.kind = ElementKind::Link;
        link.href = Some("https://a.com/docs".to_string());

        InteractionExecutor::new(&driver, &settings)
            .interact(&link, None, None)
            .await;

        let calls = driver.calls();
        assert!(calls.iter().any(|c| c.starts_with("click_at:")));
        assert!(calls.contains(&"navigate:https://a.com/docs".to_string()));
    }

    #[tokio::test]
    async fn scroll_hint_scrolls_instead_of_clicking() {
        let driver = FakeDriver::new(&["https://a.com"]).on("scrollBy", serde_json::json!(true));
        let settings = settings();

        let outcome = InteractionExecutor::new(&driver, &settings)
            .interact(&button("#feed"), Some("scroll"), None)
            .await;

        assert_eq!(outcome.action, ActionKind::Scroll);
        let calls = driver.calls();
        assert!(calls.contains(&"eval:scrollBy".to_string()));
        assert!(!calls.iter().any(|c| c.starts_with("click_at:")));
    }

    #[test]
    fn attribute_relocation_embeds_accessible_name() {
        let mut el = button("#gone");
        el.accessible_name = Some("Open menu".to_string());

        let script = click_by_attrs_script(&el);
        assert!(script.contains(r#"const name = "Open menu""#));
        assert!(script.contains("aria-label"));
    }

    #[tokio::test]
    async fn same_path_link_is_not_direct_navigated() {
        let driver =
            FakeDriver::new(&["https://a.com/docs"]).on("el.click()", serde_json::json!(false));
        let settings = settings();

        let mut link = button("a.self");
        link.kind = ElementKind::Link;
        link.href = Some("https://a.com/docs#section".to_string());

        InteractionExecutor::new(&driver, &settings)
            .interact(&link, None, None)
            .await;

        assert!(!driver.calls().iter().any(|c| c.starts_with("navigate:")));
    }

    #[tokio::test]
    async fn input_elements_are_filled() {
        let driver = FakeDriver::new(&["https://a.com"])
            .on("dispatchEvent", serde_json::json!("test@example.com"));
        let settings = settings();

        let mut input = button("input[name=email]");
        input.kind = ElementKind::Input;

        let outcome = InteractionExecutor::new(&driver, &settings)
            .interact(&input, None, None)
            .await;

        assert_eq!(outcome.action, ActionKind::Fill);
        assert_eq!(outcome.value.as_deref(), Some("test@example.com"));
        assert!(!outcome.navigated);
    }

    #[tokio::test]
    async fn oracle_value_hint_is_embedded() {
        let driver = FakeDriver::new(&["https://a.com"]);
        let settings = settings();

        let mut input = button("input#q");
        input.kind = ElementKind::Input;

        // The hint must survive JSON embedding; scripted driver returns Null
        // so the outcome simply records no written value
        let outcome = InteractionExecutor::new(&driver, &settings)
            .interact(&input, None, Some("search \"term\""))
            .await;

        assert_eq!(outcome.action, ActionKind::Fill);
        assert!(outcome.value.is_none());
    }

    #[tokio::test]
    async fn fragment_change_is_reported_as_fragment_only() {
        let driver = FakeDriver::new(&["https://a.com/app", "https://a.com/app#/settings"]).on(
            "elementFromPoint",
            serde_json::json!({ "x": 5.0, "y": 5.0, "obstructed": false }),
        );
        let settings = settings();

        let outcome = InteractionExecutor::new(&driver, &settings)
            .interact(&button("#nav"), None, None)
            .await;

        assert!(!outcome.navigated);
        assert!(outcome.fragment_only);
    }

    #[tokio::test]
    async fn total_failure_still_yields_an_outcome() {
        let driver = FakeDriver::new(&["https://a.com"]);
        let settings = settings();

        let outcome = InteractionExecutor::new(&driver, &settings)
            .interact(&button("#gone"), None, None)
            .await;

        assert!(!outcome.navigated);
        assert_eq!(outcome.url_before, outcome.url_after);
    }

    #[tokio::test]
    async fn hover_hint_dispatches_mouse_move() {
        let driver = FakeDriver::new(&["https://a.com"]).on(
            "elementFromPoint",
            serde_json::json!({ "x": 7.0, "y": 9.0, "obstructed": false }),
        );
        let settings = settings();

        let outcome = InteractionExecutor::new(&driver, &settings)
            .interact(&button("#menu"), Some("hover"), None)
            .await;

        assert_eq!(outcome.action, ActionKind::Hover);
        assert!(driver.calls().contains(&"hover_at:7,9".to_string()));
    }

    #[test]
    fn shadow_path_is_embedded_into_scripts() {
        let mut el = button("#inner");
        el.shadow_path = Some(vec!["my-app".to_string(), "nav-menu".to_string()]);

        let script = with_target(LOCATE_JS, &el, &el.selector);
        assert!(script.contains(r#"["my-app","nav-menu"]"#));
        assert!(script.contains("\"#inner\""));
    }
}
