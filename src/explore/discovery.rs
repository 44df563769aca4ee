use crate::browser::PageDriver;
use crate::config::ExploreSettings;

use super::element::InteractiveElement;

/// Primary scan: walk the document and every open shadow root with an
/// explicit stack, recording a host-selector path per element so the
/// executor can re-locate nodes later without holding live references.
const SCAN_JS: &str = r#"
(function() {
    const EXCLUDED = __EXCLUDED__;
    const KINDS = __KINDS__;
    const ORIGIN = __ORIGIN__;
    const MAX_TEXT = 80;

    function esc(s) {
        return (window.CSS && CSS.escape) ? CSS.escape(s) : s.replace(/([^a-zA-Z0-9_-])/g, '\\$1');
    }
    function looksRandom(id) {
        if (!id) return true;
        if (/\d{4,}/.test(id)) return true;
        if (/^[0-9a-f]{8}-[0-9a-f]{4}/i.test(id)) return true;
        if (/^(radix|ember|react|mui|headlessui|aria)[-:_]/i.test(id)) return true;
        return id.length > 24;
    }
    function selectorFor(el) {
        if (el.id && !looksRandom(el.id)) return '#' + esc(el.id);
        const testId = el.getAttribute('data-testid');
        if (testId) return '[data-testid="' + testId + '"]';
        const parts = [];
        let node = el;
        while (node && node.nodeType === 1 && parts.length < 5) {
            if (node.id && !looksRandom(node.id)) {
                parts.unshift('#' + esc(node.id));
                break;
            }
            let part = node.tagName.toLowerCase();
            const parent = node.parentElement;
            if (parent) {
                const same = Array.from(parent.children).filter(c => c.tagName === node.tagName);
                if (same.length > 1) part += ':nth-of-type(' + (same.indexOf(node) + 1) + ')';
            }
            parts.unshift(part);
            node = parent;
        }
        return parts.join(' > ');
    }
    function isExcluded(el) {
        let node = el;
        while (node) {
            if (node.nodeType === 1) {
                for (const sel of EXCLUDED) {
                    try { if (node.matches(sel)) return true; } catch (e) {}
                }
            }
            if (node.parentElement) { node = node.parentElement; continue; }
            const root = node.getRootNode ? node.getRootNode() : null;
            node = (root && root.host) ? root.host : null;
        }
        return false;
    }
    function isVisible(el) {
        const rect = el.getBoundingClientRect();
        if (rect.width <= 0 || rect.height <= 0) return false;
        const style = window.getComputedStyle(el);
        if (style.display === 'none' || style.visibility === 'hidden') return false;
        if (parseFloat(style.opacity) === 0) return false;
        return true;
    }
    function accessibleName(el) {
        const aria = el.getAttribute('aria-label');
        if (aria) return aria.trim();
        const labelledBy = el.getAttribute('aria-labelledby');
        if (labelledBy) {
            const label = document.getElementById(labelledBy);
            if (label && label.textContent) return label.textContent.trim().slice(0, 100);
        }
        const tag = el.tagName.toLowerCase();
        if (tag === 'input' || tag === 'textarea' || tag === 'select') {
            if (el.id) {
                const label = document.querySelector('label[for="' + esc(el.id) + '"]');
                if (label && label.textContent) return label.textContent.trim().slice(0, 100);
            }
            return el.getAttribute('placeholder') || el.getAttribute('title') || '';
        }
        if (tag === 'img') return el.getAttribute('alt') || '';
        return el.getAttribute('title') || '';
    }
    function kindOf(el) {
        const tag = el.tagName.toLowerCase();
        if (tag === 'a' && el.hasAttribute('href')) return 'link';
        if (tag === 'button') return 'button';
        if (tag === 'input') {
            const type = (el.getAttribute('type') || 'text').toLowerCase();
            if (type === 'hidden') return null;
            if (['button', 'submit', 'reset'].includes(type)) return 'button';
            return 'input';
        }
        if (tag === 'textarea' || tag === 'select') return 'input';
        const role = el.getAttribute('role');
        if (role === 'link') return 'link';
        if (role === 'button') return 'button';
        if (role === 'menuitem' || role === 'tab' || role === 'option') return 'generic';
        if (el.onclick || el.hasAttribute('onclick')) return 'generic';
        return null;
    }

    const results = [];
    const stack = [[document, []]];
    while (stack.length) {
        const [root, hostPath] = stack.pop();
        let nodes;
        try { nodes = root.querySelectorAll('*'); } catch (e) { continue; }
        for (const el of nodes) {
            try {
                if (el.shadowRoot) {
                    stack.push([el.shadowRoot, hostPath.concat([selectorFor(el)])]);
                }
                const kind = kindOf(el);
                if (!kind || !KINDS.includes(kind)) continue;
                if (!isVisible(el) || isExcluded(el)) continue;

                let href = null;
                if (kind === 'link') {
                    href = el.href || null;
                    if (!href || !href.startsWith(ORIGIN)) continue;
                    let u;
                    try { u = new URL(href); } catch (e) { continue; }
                    if (u.pathname === location.pathname && u.search === location.search) {
                        if (!u.hash || u.hash === location.hash) continue;
                    }
                }

                const rect = el.getBoundingClientRect();
                results.push({
                    kind: kind,
                    text: (el.innerText || el.value || '').trim().slice(0, MAX_TEXT),
                    selector: selectorFor(el),
                    accessible_name: accessibleName(el) || null,
                    href: href,
                    stable_id: (el.id && !looksRandom(el.id)) ? el.id : null,
                    shadow_path: hostPath.length ? hostPath : null,
                    rect: { x: rect.x, y: rect.y, width: rect.width, height: rect.height },
                    visible: true
                });
            } catch (e) { /* skip this element, keep scanning */ }
        }
    }
    return results;
})()
"#;

/// Fallback scan for pages where the primary walk finds nothing: broaden
/// the predicate to anything that looks clickable at all.
const FALLBACK_SCAN_JS: &str = r#"
(function() {
    const EXCLUDED = __EXCLUDED__;
    const KINDS = __KINDS__;
    const ROLES = ['button', 'link', 'menuitem', 'tab', 'option', 'checkbox', 'radio', 'switch'];
    const MAX_TEXT = 80;

    function isExcluded(el) {
        let node = el;
        while (node) {
            for (const sel of EXCLUDED) {
                try { if (node.matches(sel)) return true; } catch (e) {}
            }
            node = node.parentElement;
        }
        return false;
    }
    function isVisible(el) {
        const rect = el.getBoundingClientRect();
        if (rect.width <= 0 || rect.height <= 0) return false;
        const style = window.getComputedStyle(el);
        return style.display !== 'none' && style.visibility !== 'hidden' && parseFloat(style.opacity) !== 0;
    }
    function selectorFor(el) {
        const parts = [];
        let node = el;
        while (node && node.nodeType === 1 && parts.length < 5) {
            let part = node.tagName.toLowerCase();
            const parent = node.parentElement;
            if (parent) {
                const same = Array.from(parent.children).filter(c => c.tagName === node.tagName);
                if (same.length > 1) part += ':nth-of-type(' + (same.indexOf(node) + 1) + ')';
            }
            parts.unshift(part);
            node = parent;
        }
        return parts.join(' > ');
    }

    const results = [];
    for (const el of document.querySelectorAll('*')) {
        try {
            const role = el.getAttribute('role');
            const clickable =
                el.onclick || el.hasAttribute('onclick') ||
                (role && ROLES.includes(role)) ||
                el.tabIndex >= 0 ||
                window.getComputedStyle(el).cursor === 'pointer';
            if (!clickable) continue;
            if (!isVisible(el) || isExcluded(el)) continue;

            const tag = el.tagName.toLowerCase();
            const kind = (tag === 'a' && el.hasAttribute('href')) ? 'link'
                : (tag === 'button') ? 'button'
                : (tag === 'input' || tag === 'textarea' || tag === 'select') ? 'input'
                : 'generic';
            if (!KINDS.includes(kind)) continue;

            const rect = el.getBoundingClientRect();
            results.push({
                kind: kind,
                text: (el.innerText || '').trim().slice(0, MAX_TEXT),
                selector: selectorFor(el),
                accessible_name: el.getAttribute('aria-label') || null,
                href: (tag === 'a' && el.href && el.href.startsWith(location.origin)) ? el.href : null,
                stable_id: null,
                shadow_path: null,
                rect: { x: rect.x, y: rect.y, width: rect.width, height: rect.height },
                visible: true
            });
        } catch (e) { /* skip */ }
    }
    return results;
})()
"#;

fn render_scan_js(template: &str, origin: &str, settings: &ExploreSettings) -> String {
    let excluded = serde_json::to_string(&settings.excluded_regions).unwrap_or_else(|_| "[]".into());
    let kinds = serde_json::to_string(&settings.element_kinds).unwrap_or_else(|_| "[]".into());
    let origin = serde_json::to_string(origin).unwrap_or_else(|_| "\"\"".into());

    template
        .replace("__EXCLUDED__", &excluded)
        .replace("__KINDS__", &kinds)
        .replace("__ORIGIN__", &origin)
}

fn parse_elements(value: serde_json::Value) -> Vec<InteractiveElement> {
    let items = match value {
        serde_json::Value::Array(items) => items,
        _ => return Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(el) => Some(el),
            Err(e) => {
                tracing::debug!("Skipping malformed element from scan: {}", e);
                None
            }
        })
        .collect()
}

/// Scan the current page for visible, non-excluded interactive elements,
/// traversing into nested shadow roots. Never errors: scan failures
/// degrade to an empty or partial result, and a zero-result primary pass
/// falls back to a broadened clickability scan.
pub async fn discover_elements(
    driver: &dyn PageDriver,
    origin: &str,
    settings: &ExploreSettings,
) -> Vec<InteractiveElement> {
    let script = render_scan_js(SCAN_JS, origin, settings);
    let elements = match driver.evaluate(&script).await {
        Ok(value) => parse_elements(value),
        Err(e) => {
            tracing::debug!("Primary element scan failed: {}", e);
            Vec::new()
        }
    };

    if !elements.is_empty() {
        tracing::debug!("Discovered {} interactive elements", elements.len());
        return elements;
    }

    tracing::debug!("Primary scan found nothing, trying fallback scan");
    let script = render_scan_js(FALLBACK_SCAN_JS, origin, settings);
    match driver.evaluate(&script).await {
        Ok(value) => {
            let elements = parse_elements(value);
            tracing::debug!("Fallback scan found {} elements", elements.len());
            elements
        }
        Err(e) => {
            tracing::debug!("Fallback element scan failed: {}", e);
            Vec::new()
        }
    }
}
