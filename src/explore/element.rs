use serde::{Deserialize, Serialize};

use super::urls::normalize_url;

/// What kind of interaction a discovered element affords
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Link,
    Button,
    Input,
    /// Anything clickable that is not a link, button, or input
    Generic,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Link => "link",
            ElementKind::Button => "button",
            ElementKind::Input => "input",
            ElementKind::Generic => "generic",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// A candidate for interaction, re-derived on every scan. Nothing here is a
/// live browser reference; the executor re-locates the element from these
/// attributes when it acts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractiveElement {
    pub kind: ElementKind,

    /// Trimmed, length-capped display text
    #[serde(default)]
    pub text: String,

    /// Best-effort structural locator
    pub selector: String,

    #[serde(default)]
    pub accessible_name: Option<String>,

    /// Absolute target URL, links only
    #[serde(default)]
    pub href: Option<String>,

    /// Element id, absent when it looks randomly generated
    #[serde(default)]
    pub stable_id: Option<String>,

    /// Host-element selectors to traverse, outermost first, when the
    /// element lives inside nested shadow roots
    #[serde(default)]
    pub shadow_path: Option<Vec<String>>,

    #[serde(default)]
    pub rect: BoundingBox,

    #[serde(default)]
    pub visible: bool,
}

impl InteractiveElement {
    /// Normalized signature used for de-duplication. Two elements with the
    /// same key are the same action even when freshly re-discovered.
    pub fn interaction_key(&self) -> InteractionKey {
        let href = self
            .href
            .as_deref()
            .map(normalize_url)
            .unwrap_or_default();
        let selector: String = self.selector.chars().take(60).collect();
        let text: String = self.text.to_lowercase().chars().take(40).collect();

        InteractionKey(format!(
            "{}|{}|{}|{}",
            self.kind.as_str(),
            href,
            selector,
            text
        ))
    }

    pub fn in_shadow(&self) -> bool {
        self.shadow_path.as_ref().is_some_and(|p| !p.is_empty())
    }
}

/// Normalized signature of an element, see [`InteractiveElement::interaction_key`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InteractionKey(String);

impl InteractionKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InteractionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn link(text: &str, href: &str) -> InteractiveElement {
        InteractiveElement {
            kind: ElementKind::Link,
            text: text.to_string(),
            selector: "nav > a.item".to_string(),
            accessible_name: None,
            href: Some(href.to_string()),
            stable_id: None,
            shadow_path: None,
            rect: BoundingBox {
                x: 10.0,
                y: 10.0,
                width: 100.0,
                height: 20.0,
            },
            visible: true,
        }
    }

    #[test]
    fn interaction_key_is_deterministic() {
        let el = link("Pricing", "https://example.com/pricing");
        assert_eq!(el.interaction_key(), el.interaction_key());
    }

    #[test]
    fn interaction_key_ignores_fragment_and_trailing_slash() {
        let a = link("Docs", "https://example.com/docs/");
        let b = link("Docs", "https://example.com/docs#top");
        assert_eq!(a.interaction_key(), b.interaction_key());
    }

    #[test]
    fn interaction_key_distinguishes_kinds() {
        let a = link("Go", "https://example.com/go");
        let mut b = a.clone();
        b.kind = ElementKind::Button;
        assert_ne!(a.interaction_key(), b.interaction_key());
    }

    #[test]
    fn interaction_key_is_case_insensitive_on_text() {
        let a = link("Sign In", "https://example.com/login");
        let b = link("sign in", "https://example.com/login");
        assert_eq!(a.interaction_key(), b.interaction_key());
    }

    #[test]
    fn bounding_box_center() {
        let rect = BoundingBox {
            x: 10.0,
            y: 20.0,
            width: 100.0,
            height: 40.0,
        };
        assert_eq!(rect.center(), (60.0, 40.0));
        assert!(rect.has_area());
        assert!(!BoundingBox::default().has_area());
    }

    #[test]
    fn element_deserializes_from_scan_payload() {
        let json = serde_json::json!({
            "kind": "link",
            "text": "About us",
            "selector": "#about",
            "href": "https://example.com/about",
            "shadow_path": ["my-app", "nav-menu"],
            "rect": { "x": 1.0, "y": 2.0, "width": 30.0, "height": 10.0 },
            "visible": true
        });

        let el: InteractiveElement = serde_json::from_value(json).unwrap();
        assert_eq!(el.kind, ElementKind::Link);
        assert!(el.in_shadow());
        assert_eq!(el.shadow_path.as_ref().unwrap().len(), 2);
        assert!(el.stable_id.is_none());
    }
}
